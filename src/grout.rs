use crate::error::{DriverError, PdfResult};

/// One decoded line of intermediate output.
///
/// The first byte of every line is the command letter; the payload grammar
/// depends on the letter. Lines starting with `+` carry no operation, and
/// an empty line terminates the input (the caller handles both).
#[derive(Debug, PartialEq)]
pub enum Command<'a> {
    /// `x` device control.
    Control(Control<'a>),
    /// `p` begin page; the page index is ignored.
    BeginPage,
    /// `f` select the font mounted at this slot.
    SelectFont(u32),
    /// `s` set the type size, in scaled units.
    TypeSize(u32),
    /// `t` typeset the literal bytes of a word.
    Word(&'a [u8]),
    /// `C` typeset a named special glyph.
    SpecialGlyph(&'a str),
    /// `D` drawing command; recognized and discarded.
    Draw,
    /// `h` relative horizontal move, in scaled units.
    MoveRight(u32),
    /// `v` relative vertical move; the absolute `V` commands emitted by the
    /// front-end suffice, so this is ignored with a warning.
    MoveDown,
    /// `H` absolute horizontal position, in scaled units.
    AbsHorizontal(u32),
    /// `V` absolute vertical position, in scaled units.
    AbsVertical(u32),
    /// `w` inter-word gap; the rest of the line is a command of its own and
    /// is re-dispatched as if the `w` were absent.
    InterWord(Box<Command<'a>>),
    /// `n` end of output line; the break amounts are ignored.
    Newline,
    /// `m` color command; recognized and discarded.
    Color,
}

/// An `x` sub-command.
#[derive(Debug, PartialEq)]
pub enum Control<'a> {
    Init,
    /// Device resolution in units per inch.
    Resolution(u32),
    Typesetter(&'a str),
    MountFont { slot: u32, short: &'a str },
    /// `X papersize=W,H` in scaled units.
    PaperSize { width: u32, height: u32 },
    Trailer,
    Stop,
}

/// Byte cursor over a single line of intermediate output.
struct Scanner<'a> {
    line: &'a [u8],
    pos: usize,
    /// 1-based input line number, for diagnostics.
    number: usize,
}

impl<'a> Scanner<'a> {
    fn peek_byte(&self) -> Option<u8> {
        self.line.get(self.pos).copied()
    }

    fn next_byte(&mut self) -> Option<u8> {
        self.line.get(self.pos).copied().map(|b| {
            self.pos += 1;
            b
        })
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek_byte(), Some(b' ' | b'\t')) {
            self.pos += 1;
        }
    }

    fn rest(&self) -> &'a [u8] {
        &self.line[self.pos..]
    }

    /// Unsigned decimal argument. A trailing `z` tag from the device
    /// description may follow the digits and is stripped.
    fn lex_unsigned(&mut self) -> PdfResult<u32> {
        self.skip_whitespace();
        let start = self.pos;
        let mut value: u32 = 0;
        while let Some(b @ b'0'..=b'9') = self.peek_byte() {
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(u32::from(b - b'0')))
                .ok_or_else(|| {
                    anyhow::anyhow!(DriverError::Parse {
                        line: self.number,
                        what: "numeric argument overflows 32 bits".to_owned(),
                    })
                })?;
            self.pos += 1;
        }
        if self.pos == start {
            anyhow::bail!(DriverError::Parse {
                line: self.number,
                what: format!(
                    "expected unsigned integer, found {:?}",
                    self.peek_byte().map(char::from)
                ),
            });
        }
        if self.peek_byte() == Some(b'z') {
            self.pos += 1;
        }
        Ok(value)
    }

    fn lex_word(&mut self) -> PdfResult<&'a str> {
        self.skip_whitespace();
        let start = self.pos;
        while let Some(b) = self.peek_byte() {
            if b == b' ' || b == b'\t' {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            anyhow::bail!(DriverError::Parse {
                line: self.number,
                what: "expected word".to_owned(),
            });
        }
        std::str::from_utf8(&self.line[start..self.pos]).map_err(|_| {
            anyhow::anyhow!(DriverError::Parse {
                line: self.number,
                what: "word argument is not valid text".to_owned(),
            })
        })
    }
}

/// Decode one line. `Ok(None)` means the line carries no operation: a `+`
/// continuation marker, or a bare `w` with nothing to re-dispatch.
pub fn parse_line(line: &[u8], number: usize) -> PdfResult<Option<Command<'_>>> {
    let Some(&letter) = line.first() else {
        return Ok(None);
    };
    let mut s = Scanner {
        line,
        pos: 1,
        number,
    };
    Ok(Some(match letter {
        b'+' => return Ok(None),
        b'x' => Command::Control(parse_control(&mut s)?),
        b'p' => Command::BeginPage,
        b'f' => Command::SelectFont(s.lex_unsigned()?),
        b's' => Command::TypeSize(s.lex_unsigned()?),
        b't' => Command::Word(s.rest()),
        b'C' => Command::SpecialGlyph(s.lex_word()?),
        b'D' => Command::Draw,
        b'h' => Command::MoveRight(s.lex_unsigned()?),
        b'v' => Command::MoveDown,
        b'H' => Command::AbsHorizontal(s.lex_unsigned()?),
        b'V' => Command::AbsVertical(s.lex_unsigned()?),
        b'w' => {
            return Ok(
                parse_line(&line[1..], number)?.map(|cmd| Command::InterWord(Box::new(cmd)))
            );
        }
        b'n' => Command::Newline,
        b'm' => Command::Color,
        _ => anyhow::bail!(DriverError::Parse {
            line: number,
            what: format!("unknown command `{}`", char::from(letter)),
        }),
    }))
}

fn parse_control<'a>(s: &mut Scanner<'a>) -> PdfResult<Control<'a>> {
    let word = s.lex_word()?;
    Ok(match word {
        "init" => Control::Init,
        // the horizontal and vertical motion quanta that follow the
        // resolution are not needed for positioning
        "res" => Control::Resolution(s.lex_unsigned()?),
        "T" => Control::Typesetter(s.lex_word()?),
        "font" => Control::MountFont {
            slot: s.lex_unsigned()?,
            short: s.lex_word()?,
        },
        "X" => parse_escape(s)?,
        "trailer" => Control::Trailer,
        "stop" => Control::Stop,
        other => anyhow::bail!(DriverError::Parse {
            line: s.number,
            what: format!("unknown device control `x {}`", other),
        }),
    })
}

fn parse_escape<'a>(s: &mut Scanner<'a>) -> PdfResult<Control<'a>> {
    const PAPERSIZE: &[u8] = b"papersize=";

    s.skip_whitespace();
    if !s.rest().starts_with(PAPERSIZE) {
        anyhow::bail!(DriverError::Parse {
            line: s.number,
            what: format!(
                "unrecognized escape `{}`",
                String::from_utf8_lossy(s.rest())
            ),
        });
    }
    s.pos += PAPERSIZE.len();
    let width = s.lex_unsigned()?;
    match s.next_byte() {
        Some(b',') => {}
        found => anyhow::bail!(DriverError::Parse {
            line: s.number,
            what: format!(
                "expected `,` between papersize dimensions, found {:?}",
                found.map(char::from)
            ),
        }),
    }
    let height = s.lex_unsigned()?;
    Ok(Control::PaperSize { width, height })
}
