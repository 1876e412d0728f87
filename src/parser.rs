use crate::error::{Result, SubsyncError};
use crate::srt::CaptionEntry;

use std::fmt;
use std::time::Duration;

use nom::branch::alt;
use nom::bytes::complete::{tag, take_while_m_n};
use nom::character::complete::{char, digit1, space0, space1};
use nom::combinator::{all_consuming, eof, map_res};
use nom::error::{ErrorKind, ParseError, VerboseError};
use nom::sequence::delimited;
use nom::IResult;
use tracing::debug;

type ParseResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

/// Why a block was left out of the track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingIndex,
    MissingTiming,
    BadTiming,
    NoText,
    EndsBeforeStart,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            SkipReason::MissingIndex => "missing sequence number",
            SkipReason::MissingTiming => "missing timing line",
            SkipReason::BadTiming => "unparsable timing line",
            SkipReason::NoText => "no caption text",
            SkipReason::EndsBeforeStart => "caption ends before it starts",
        };
        write!(fmt, "{}", msg)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedBlock {
    /// 1-based line number of the first line of the block.
    pub line: usize,
    pub reason: SkipReason,
}

/// Best-effort SRT parser. Malformed blocks are dropped one by one and
/// remembered, the parse only fails when nothing usable is left.
#[derive(Default)]
pub struct Parser {
    skipped: Vec<SkippedBlock>,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&mut self, input: &str) -> Result<Vec<CaptionEntry>> {
        self.skipped.clear();
        let input = input.strip_prefix('\u{FEFF}').unwrap_or(input);

        let mut entries = Vec::new();
        for block in split_blocks(input) {
            match caption(&block) {
                Ok(entry) => entries.push(entry),
                Err(reason) => {
                    debug!(line = block.first_line, %reason, "skipping malformed subtitle block");
                    self.skipped.push(SkippedBlock {
                        line: block.first_line,
                        reason,
                    });
                }
            }
        }

        if entries.is_empty() {
            let msg = match self.skipped.first() {
                Some(first) => format!(
                    "No valid subtitle blocks found ({} malformed, first at line {}: {})",
                    self.skipped.len(),
                    first.line,
                    first.reason
                ),
                None => "No subtitle blocks found".to_string(),
            };
            return Err(SubsyncError::Parse(msg));
        }

        entries.sort_by_key(|e| e.show_at);
        Ok(entries)
    }

    pub fn skipped(&self) -> &[SkippedBlock] {
        &self.skipped
    }
}

struct Block<'a> {
    first_line: usize,
    lines: Vec<&'a str>,
}

fn split_blocks(input: &str) -> Vec<Block<'_>> {
    let lines: Vec<&str> = input.lines().collect();
    let mut blocks = Vec::new();
    let mut current: Option<Block> = None;

    for (i, &line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            blocks.extend(current.take());
            continue;
        }

        // A sequence number directly followed by a timing line inside the
        // text of a block means the separating blank line went missing.
        let starts_cue = current.as_ref().map_or(false, |b| b.lines.len() >= 2)
            && index_line(line).is_ok()
            && lines.get(i + 1).map_or(false, |next| timing_line(next).is_ok());
        if starts_cue {
            blocks.extend(current.take());
        }

        current
            .get_or_insert_with(|| Block {
                first_line: i + 1,
                lines: Vec::new(),
            })
            .lines
            .push(line);
    }
    blocks.extend(current);
    blocks
}

fn caption(block: &Block) -> std::result::Result<CaptionEntry, SkipReason> {
    let mut lines = block.lines.iter().copied();

    let index = lines
        .next()
        .and_then(|line| index_line(line).ok())
        .map(|(_, index)| index)
        .ok_or(SkipReason::MissingIndex)?;

    let timing = lines.next().ok_or(SkipReason::MissingTiming)?;
    let (_, (show_at, hide_at)) = timing_line(timing).map_err(|_| SkipReason::BadTiming)?;
    if hide_at < show_at {
        return Err(SkipReason::EndsBeforeStart);
    }

    let text: Vec<&str> = lines.map(str::trim_end).collect();
    if text.is_empty() {
        return Err(SkipReason::NoText);
    }

    Ok(CaptionEntry::new(index, show_at, hide_at, text.join("\n")))
}

fn index_line(input: &str) -> ParseResult<u32> {
    all_consuming(delimited(space0, seq_num, space0))(input)
}

fn timing_line(input: &str) -> ParseResult<(Duration, Duration)> {
    let (input, _) = space0(input)?;
    show_hide(input)
}

fn show_hide(input: &str) -> ParseResult<(Duration, Duration)> {
    let (input, show_at) = timestamp(input)?;
    let (input, _) = space0(input)?;
    let (input, _) = tag("-->")(input)?;
    let (input, _) = space0(input)?;
    let (input, hide_at) = timestamp(input)?;
    // Position hints after the end time (`X1:40 X2:600 ...`) are ignored.
    let (input, _) = alt((eof, space1))(input)?;

    Ok((input, (show_at, hide_at)))
}

fn timestamp(input: &str) -> ParseResult<Duration> {
    const MILLIS_MIN: usize = 0;
    const MILLIS_MAX: usize = 3;
    let mut take_millis = map_res(
        take_while_m_n(MILLIS_MIN, MILLIS_MAX, |c: char| c.is_ascii_digit()),
        |s: &str| {
            if s.len() < MILLIS_MAX {
                // `,2` is not valid SRT but shows up in hand-edited files.
                // It is read as `,200`, so the value is right-padded.
                format!("{:0<3}", s).parse()
            } else {
                s.parse()
            }
        },
    );

    let (input, hours): (_, u64) = map_res(digit1, |s: &str| s.parse())(input)?;
    let (input, _) = char(':')(input)?;
    let (input, minutes) = sexagesimal(input)?;
    let (input, _) = char(':')(input)?;
    let (input, seconds) = sexagesimal(input)?;
    let (input, _) = alt((char(','), char('.')))(input)?;
    let (rest, millis): (_, u64) = take_millis(input)?;

    // Absurd hour counts must not overflow; the block is dropped instead.
    let total = hours
        .checked_mul(60 * 60 * 1000)
        .and_then(|ms| ms.checked_add(minutes * 60 * 1000 + seconds * 1000 + millis));
    match total {
        Some(total) => Ok((rest, Duration::from_millis(total))),
        None => Err(nom::Err::Error(VerboseError::from_error_kind(
            input,
            ErrorKind::TooLarge,
        ))),
    }
}

/// Minutes or seconds: one or two digits, below 60. `1:1:1,200` reads as `01:01:01,200`.
fn sexagesimal(input: &str) -> ParseResult<u64> {
    map_res(
        take_while_m_n(1, 2, |c: char| c.is_ascii_digit()),
        |s: &str| match s.parse::<u64>() {
            Ok(value) if value < 60 => Ok(value),
            Ok(value) => Err(format!("{} is out of range", value)),
            Err(err) => Err(err.to_string()),
        },
    )(input)
}

fn seq_num(input: &str) -> ParseResult<u32> {
    map_res(digit1, |s: &str| s.parse())(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! test_read_ts {
        ($($name:ident: $value:expr,)*) => {
        $(
            #[test]
            fn $name() {
                let (input, expected) = $value;

                let (_, duration) = timestamp(input).unwrap();

                assert_eq!(duration.as_millis(), expected);
            }
        )*
        }
    }

    test_read_ts! {
        test_read_ts_0: ("00:00:01,200", 1200),
        test_read_ts_1: ("00:00:01,2", 1200),
        test_read_ts_2: ("00:00:01,002", 1002),
        test_read_ts_3: ("00:00:01,02", 1020),
        test_read_ts_4: ("00:00:01,", 1000),
        test_read_ts_5: ("1:1:1,200", 3661200),
        test_read_ts_6: ("01:01:01,200", 3661200),
        test_read_ts_7: ("100:00:00,001", 360_000_001),
        test_read_ts_8: ("00:00:01.500", 1500),
    }

    #[test]
    fn rejects_out_of_range_fields() {
        assert!(timestamp("00:61:00,000").is_err());
        assert!(timestamp("00:00:75,000").is_err());
        assert!(timestamp("99999999999999999:00:00,000").is_err());
    }

    fn parse(input: &str) -> (Vec<CaptionEntry>, Vec<SkippedBlock>) {
        let mut parser = Parser::new();
        let entries = parser.parse(input).unwrap();
        (entries, parser.skipped().to_vec())
    }

    #[test]
    fn parses_two_blocks() {
        let (entries, skipped) = parse(
            "1\n00:00:01,000 --> 00:00:03,500\nHello\n\n2\n00:00:04,000 --> 00:00:06,000\nWorld\n",
        );
        assert!(skipped.is_empty());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].index(), 1);
        assert_eq!(entries[0].start_secs(), 1.0);
        assert_eq!(entries[0].end_secs(), 3.5);
        assert_eq!(entries[0].text(), "Hello");
        assert_eq!(entries[1].index(), 2);
        assert_eq!(entries[1].text(), "World");
    }

    #[test]
    fn joins_multi_line_text_and_trims_trailing_whitespace() {
        let (entries, _) = parse("7\n00:00:01,000 --> 00:00:02,000  \nfirst line   \nsecond line\t\n");
        assert_eq!(entries[0].text(), "first line\nsecond line");
    }

    #[test]
    fn handles_crlf_bom_and_trailing_blank_lines() {
        let input = "\u{FEFF}1\r\n00:00:01,000 --> 00:00:02,000\r\nHi\r\n\r\n\r\n2\r\n00:00:03,000 --> 00:00:04,000\r\nThere\r\n\r\n\r\n";
        let (entries, skipped) = parse(input);
        assert!(skipped.is_empty());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].text(), "There");
    }

    #[test]
    fn skips_malformed_blocks() {
        let input = "\
1
00:00:01,000 --> 00:00:02,000
kept

2
this is not a timing line
dropped

3
00:00:05,000 --> 00:00:04,000
backwards

4
00:00:06,000 --> 00:00:07,000

five
00:00:08,000 --> 00:00:09,000
no index

6
00:00:10,000 --> 00:00:11,000
also kept
";
        let (entries, skipped) = parse(input);
        let texts: Vec<&str> = entries.iter().map(|e| e.text()).collect();
        assert_eq!(texts, vec!["kept", "also kept"]);

        let reasons: Vec<SkipReason> = skipped.iter().map(|s| s.reason).collect();
        assert_eq!(
            reasons,
            vec![
                SkipReason::BadTiming,
                SkipReason::EndsBeforeStart,
                SkipReason::NoText,
                SkipReason::MissingIndex,
            ]
        );
        assert_eq!(skipped[0].line, 5);
    }

    #[test]
    fn missing_timing_line_is_skipped() {
        let (entries, skipped) = parse("1\n\n2\n00:00:01,000 --> 00:00:02,000\nok\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(skipped[0].reason, SkipReason::MissingTiming);
    }

    #[test]
    fn splits_blocks_missing_a_blank_line() {
        let input = "1\n00:00:01,000 --> 00:00:02,000\nfirst\n2\n00:00:03,000 --> 00:00:04,000\nsecond\n";
        let (entries, skipped) = parse(input);
        assert!(skipped.is_empty());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].text(), "first");
        assert_eq!(entries[1].text(), "second");
    }

    #[test]
    fn numeric_caption_text_stays_in_its_block() {
        let (entries, _) = parse("1\n00:00:01,000 --> 00:00:02,000\n1984\nthe year\n");
        assert_eq!(entries[0].text(), "1984\nthe year");
    }

    #[test]
    fn ignores_position_hints() {
        let (entries, _) = parse("1\n00:00:01,000 --> 00:00:02,000 X1:40 X2:600\nhint\n");
        assert_eq!(entries[0].end_secs(), 2.0);
    }

    #[test]
    fn sorts_by_start_time() {
        let (entries, _) = parse(
            "2\n00:00:05,000 --> 00:00:06,000\nlater\n\n1\n00:00:01,000 --> 00:00:02,000\nearlier\n",
        );
        assert_eq!(entries[0].index(), 1);
        assert_eq!(entries[1].index(), 2);
    }

    #[test]
    fn skips_blocks_with_oversized_hours() {
        let (entries, skipped) = parse(
            "1\n99999999999999999:00:00,000 --> 99999999999999999:00:01,000\nboom\n\n2\n00:00:01,000 --> 00:00:02,000\nok\n",
        );
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text(), "ok");
        assert_eq!(
            skipped,
            vec![SkippedBlock {
                line: 1,
                reason: SkipReason::BadTiming,
            }]
        );
    }

    #[test]
    fn fails_without_any_valid_block() {
        let mut parser = Parser::new();
        assert!(matches!(parser.parse(""), Err(SubsyncError::Parse(_))));
        assert!(matches!(
            parser.parse("hello\nworld\n"),
            Err(SubsyncError::Parse(_))
        ));
        assert_eq!(parser.skipped().len(), 1);
    }
}
