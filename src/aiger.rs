//! Reader for the ASCII AIGER format (`aag`), including the AIGER 1.9 latch
//! reset values and the symbol table.
//!
//! The reader produces a stream of [`Record`]s in file order, it does not
//! check that literals are defined; that is done when the records are
//! assembled into a [`Circuit`](crate::circuit::Circuit).

use std::fmt::{Display, Formatter};
use std::io::{BufRead, BufReader, Read};
use std::ops::Not;

use thiserror::Error;

/// Largest variable index whose literals fit in a `u32`.
pub const MAX_VARIABLE: u32 = u32::MAX >> 1;

/// An AIGER literal: `2 * variable + sign`.
///
/// Literal 0 is constant false and literal 1 is constant true.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Literal(u32);

impl Literal {
    pub const FALSE: Literal = Literal(0);
    pub const TRUE: Literal = Literal(1);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn from_variable(variable: u32, negated: bool) -> Self {
        Self((variable << 1) | negated as u32)
    }

    pub const fn variable(self) -> u32 {
        self.0 >> 1
    }

    pub const fn is_negated(self) -> bool {
        self.0 & 1 != 0
    }

    pub const fn is_constant(self) -> bool {
        self.variable() == 0
    }

    /// The non-negated literal of the same variable.
    pub const fn positive(self) -> Self {
        Self(self.0 & !1)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl Not for Literal {
    type Output = Self;

    fn not(self) -> Self::Output {
        Self(self.0 ^ 1)
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported format '{0}', expected ASCII AIGER ('aag')")]
    UnsupportedFormat(String),

    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error(transparent)]
    Model(#[from] crate::error::ModelError),
}

/// The `aag M I L O A` header line.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Header {
    /// Maximum variable index.
    pub m: usize,
    /// Number of inputs.
    pub i: usize,
    /// Number of latches.
    pub l: usize,
    /// Number of outputs.
    pub o: usize,
    /// Number of AND gates.
    pub a: usize,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SymbolKind {
    Input,
    Latch,
    Output,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Record {
    Input(Literal),
    /// A latch; `reset` is 0, 1, or the latch literal itself (uninitialised).
    Latch {
        output: Literal,
        input: Literal,
        reset: Literal,
    },
    Output(Literal),
    AndGate {
        output: Literal,
        inputs: [Literal; 2],
    },
    Symbol {
        kind: SymbolKind,
        position: usize,
        name: String,
    },
    Comment(String),
}

pub struct Reader {
    header: Header,
    /// Lines after the header, with their 1-based line numbers.
    lines: Vec<(usize, String)>,
}

impl Reader {
    pub fn from_reader(reader: impl Read) -> Result<Self, ParseError> {
        let mut lines = BufReader::new(reader)
            .lines()
            .enumerate()
            .map(|(i, line)| line.map(|line| (i + 1, line)));

        let (_, header_line) = lines.next().transpose()?.ok_or(ParseError::Syntax {
            line: 1,
            message: "missing header".to_string(),
        })?;
        let header = parse_header(&header_line)?;
        let lines = lines.collect::<Result<Vec<_>, _>>()?;

        Ok(Self { header, lines })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn records(&self) -> Records<'_> {
        Records {
            header: &self.header,
            lines: &self.lines,
            position: 0,
            in_comments: false,
        }
    }
}

fn parse_header(line: &str) -> Result<Header, ParseError> {
    let mut tokens = line.split_whitespace();
    match tokens.next() {
        Some("aag") => {}
        Some(other) => return Err(ParseError::UnsupportedFormat(other.to_string())),
        None => {
            return Err(ParseError::Syntax {
                line: 1,
                message: "empty header".to_string(),
            })
        }
    }

    let numbers = tokens
        .map(|t| parse_number(t, 1))
        .collect::<Result<Vec<usize>, _>>()?;
    if numbers.len() < 5 {
        return Err(ParseError::Syntax {
            line: 1,
            message: format!("expected 'aag M I L O A', got '{}'", line),
        });
    }
    // AIGER 1.9 extensions: B C J F
    if numbers[5..].iter().any(|&n| n != 0) {
        return Err(ParseError::Syntax {
            line: 1,
            message: "bad-state, constraint, justice and fairness sections are not supported"
                .to_string(),
        });
    }

    let header = Header {
        m: numbers[0],
        i: numbers[1],
        l: numbers[2],
        o: numbers[3],
        a: numbers[4],
    };
    let overflow = || ParseError::Syntax {
        line: 1,
        message: format!("section sizes in '{}' are too large", line),
    };
    // Every section size (and so every partial sum of them) is bounded by the
    // record count, so the record iterator can add them freely.
    header
        .i
        .checked_add(header.l)
        .and_then(|n| n.checked_add(header.o))
        .and_then(|n| n.checked_add(header.a))
        .ok_or_else(overflow)?;
    if header.m > MAX_VARIABLE as usize {
        return Err(ParseError::Syntax {
            line: 1,
            message: format!(
                "maximum variable index {} exceeds {}",
                header.m, MAX_VARIABLE
            ),
        });
    }
    let defined = header.i + header.l + header.a;
    if header.m < defined {
        return Err(ParseError::Syntax {
            line: 1,
            message: format!(
                "maximum variable index {} is smaller than I + L + A = {}",
                header.m, defined
            ),
        });
    }
    Ok(header)
}

fn parse_number(token: &str, line: usize) -> Result<usize, ParseError> {
    token.parse().map_err(|_| ParseError::Syntax {
        line,
        message: format!("expected a non-negative integer, got '{}'", token),
    })
}

fn parse_literal(token: &str, line: usize) -> Result<Literal, ParseError> {
    let value = parse_number(token, line)?;
    u32::try_from(value)
        .map(Literal::new)
        .map_err(|_| ParseError::Syntax {
            line,
            message: format!("literal {} is too large", value),
        })
}

fn parse_literals<const N: usize>(
    text: &str,
    line: usize,
    what: &str,
) -> Result<[Literal; N], ParseError> {
    let literals = text
        .split_whitespace()
        .map(|t| parse_literal(t, line))
        .collect::<Result<Vec<_>, _>>()?;
    literals.try_into().map_err(|got: Vec<Literal>| ParseError::Syntax {
        line,
        message: format!("{} expects {} literals, got {}", what, N, got.len()),
    })
}

/// Iterator over the records of a [`Reader`].
pub struct Records<'a> {
    header: &'a Header,
    lines: &'a [(usize, String)],
    position: usize,
    in_comments: bool,
}

impl Records<'_> {
    fn parse(&mut self, line: usize, text: &str) -> Result<Option<Record>, ParseError> {
        let h = self.header;
        let index = self.position;

        if self.in_comments {
            return Ok(Some(Record::Comment(text.to_string())));
        }

        if index < h.i {
            let [literal] = parse_literals::<1>(text, line, "input")?;
            return Ok(Some(Record::Input(literal)));
        }
        if index < h.i + h.l {
            let tokens = text.split_whitespace().collect::<Vec<_>>();
            let record = match tokens.as_slice() {
                [output, input] => {
                    let output = parse_literal(output, line)?;
                    Record::Latch {
                        output,
                        input: parse_literal(input, line)?,
                        reset: Literal::FALSE,
                    }
                }
                [output, input, reset] => Record::Latch {
                    output: parse_literal(output, line)?,
                    input: parse_literal(input, line)?,
                    reset: parse_literal(reset, line)?,
                },
                _ => {
                    return Err(ParseError::Syntax {
                        line,
                        message: format!("latch expects 2 or 3 literals, got {}", tokens.len()),
                    })
                }
            };
            return Ok(Some(record));
        }
        if index < h.i + h.l + h.o {
            let [literal] = parse_literals::<1>(text, line, "output")?;
            return Ok(Some(Record::Output(literal)));
        }
        if index < h.i + h.l + h.o + h.a {
            let [output, left, right] = parse_literals::<3>(text, line, "AND gate")?;
            return Ok(Some(Record::AndGate {
                output,
                inputs: [left, right],
            }));
        }

        // Symbol table and comment section.
        if text.trim() == "c" {
            self.in_comments = true;
            return Ok(None);
        }
        if text.trim().is_empty() {
            return Ok(None);
        }
        let (head, name) = text.split_once(' ').ok_or_else(|| ParseError::Syntax {
            line,
            message: format!("malformed symbol '{}'", text),
        })?;
        let kind = match head.chars().next() {
            Some('i') => SymbolKind::Input,
            Some('l') => SymbolKind::Latch,
            Some('o') => SymbolKind::Output,
            _ => {
                return Err(ParseError::Syntax {
                    line,
                    message: format!("unexpected line '{}'", text),
                })
            }
        };
        let position = parse_number(&head[1..], line)?;
        let count = match kind {
            SymbolKind::Input => h.i,
            SymbolKind::Latch => h.l,
            SymbolKind::Output => h.o,
        };
        if position >= count {
            return Err(ParseError::Syntax {
                line,
                message: format!("symbol position {} out of range", position),
            });
        }
        Ok(Some(Record::Symbol {
            kind,
            position,
            name: name.to_string(),
        }))
    }
}

impl Iterator for Records<'_> {
    type Item = Result<Record, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        let h = self.header;
        let body = h.i + h.l + h.o + h.a;
        loop {
            let Some((line, text)) = self.lines.get(self.position) else {
                if self.position < body {
                    self.position = body;
                    return Some(Err(ParseError::Syntax {
                        line: self.lines.last().map_or(1, |(n, _)| n + 1),
                        message: "unexpected end of file".to_string(),
                    }));
                }
                return None;
            };
            let res = self.parse(*line, text);
            self.position += 1;
            match res {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn read(text: &str) -> Result<Vec<Record>, ParseError> {
        let reader = Reader::from_reader(text.as_bytes())?;
        reader.records().collect()
    }

    #[test]
    fn test_literal() {
        let lit = Literal::new(7);
        assert_eq!(lit.variable(), 3);
        assert!(lit.is_negated());
        assert_eq!(lit.positive(), Literal::new(6));
        assert_eq!(!lit, Literal::new(6));
        assert_eq!(Literal::from_variable(3, true), lit);
        assert!(Literal::TRUE.is_constant());
        assert_eq!(!Literal::FALSE, Literal::TRUE);
    }

    #[test]
    fn test_read_and_gate() {
        let text = "aag 3 2 0 1 1\n2\n4\n6\n6 2 4\n";
        let reader = Reader::from_reader(text.as_bytes()).unwrap();
        assert_eq!(
            reader.header(),
            &Header {
                m: 3,
                i: 2,
                l: 0,
                o: 1,
                a: 1
            }
        );
        let records = reader.records().collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(
            records,
            vec![
                Record::Input(Literal::new(2)),
                Record::Input(Literal::new(4)),
                Record::Output(Literal::new(6)),
                Record::AndGate {
                    output: Literal::new(6),
                    inputs: [Literal::new(2), Literal::new(4)]
                },
            ]
        );
    }

    #[test]
    fn test_read_latch_resets_symbols_comments() {
        let text = "aag 3 1 2 1 0\n2\n4 5\n6 2 6\n4\ni0 controllable_go\nl1 flag\nc\nhello\nworld\n";
        let records = read(text).unwrap();
        assert_eq!(
            records[1],
            Record::Latch {
                output: Literal::new(4),
                input: Literal::new(5),
                reset: Literal::FALSE
            }
        );
        assert_eq!(
            records[2],
            Record::Latch {
                output: Literal::new(6),
                input: Literal::new(2),
                reset: Literal::new(6)
            }
        );
        assert_eq!(
            records[4],
            Record::Symbol {
                kind: SymbolKind::Input,
                position: 0,
                name: "controllable_go".to_string()
            }
        );
        assert_eq!(records[6], Record::Comment("hello".to_string()));
        assert_eq!(records.len(), 8);
    }

    #[test]
    fn test_binary_format_rejected() {
        let err = read("aig 0 0 0 0 0\n").unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedFormat(f) if f == "aig"));
    }

    #[test]
    fn test_truncated_file() {
        let err = read("aag 2 1 0 1 1\n2\n4\n").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }));
    }

    #[test]
    fn test_bad_header() {
        assert!(matches!(read("aag 1 2 3\n"), Err(ParseError::Syntax { line: 1, .. })));
        assert!(matches!(read("aag 1 1 1 0 0\n"), Err(ParseError::Syntax { line: 1, .. })));
        assert!(matches!(read("aag 1 1 0 0 0 1\n2\n"), Err(ParseError::Syntax { line: 1, .. })));
    }

    #[test]
    fn test_oversized_header() {
        let huge = usize::MAX;
        for text in [
            format!("aag 1 {huge} 1 0 0\n"),
            format!("aag 1 1 1 {huge} 0\n"),
            format!("aag {huge} 0 0 0 0\n"),
            format!("aag {} 0 0 0 0\n", MAX_VARIABLE as u64 + 1),
        ] {
            match read(&text) {
                Err(ParseError::Syntax { line: 1, .. }) => {}
                other => panic!("{:?} for {:?}", other.map(|r| r.len()), text),
            }
        }
        // The largest representable index is accepted.
        let header = Reader::from_reader(format!("aag {MAX_VARIABLE} 0 0 0 0\n").as_bytes())
            .unwrap()
            .header()
            .clone();
        assert_eq!(header.m, MAX_VARIABLE as usize);
    }

    #[test]
    fn test_gate_arity() {
        let err = read("aag 2 1 0 0 1\n2\n4 2\n").unwrap_err();
        match err {
            ParseError::Syntax { line, message } => {
                assert_eq!(line, 3);
                assert!(message.contains("AND gate"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
