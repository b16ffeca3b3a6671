use crate::{fixed::Fixed, objects::PageFontHandle};

/// Builds the text object of one page's content stream.
///
/// Glyph bytes accumulate in a word buffer until a flush point (position
/// change, font change, newline, end of the text object); a flush emits one
/// `(word) Tj`. Position changes re-emit the text matrix, with successive
/// identical matrices suppressed. Font selections are never suppressed; the
/// inter-word width is emitted only when it changes.
///
/// `e` always equals the starting position of the current word plus the
/// advance widths of every glyph appended since the last position command.
#[derive(Debug)]
pub struct TextBuilder {
    e: Fixed,
    f: Fixed,
    word_gap: Fixed,
    word: Vec<u8>,
    ops: Vec<u8>,
    last_tm: Option<(Fixed, Fixed)>,
}

impl TextBuilder {
    pub fn new() -> Self {
        TextBuilder {
            e: Fixed::ZERO,
            f: Fixed::ZERO,
            word_gap: Fixed::ZERO,
            word: Vec::new(),
            ops: Vec::new(),
            last_tm: None,
        }
    }

    pub fn e(&self) -> Fixed {
        self.e
    }

    pub fn f(&self) -> Fixed {
        self.f
    }

    pub fn select_font(&mut self, font: PageFontHandle, size: u32) {
        self.flush_word();
        self.ops
            .extend_from_slice(format!("/F{} {}. Tf\n", font.slot(), size).as_bytes());
    }

    pub fn set_word_gap(&mut self, gap: Fixed) {
        if gap == self.word_gap {
            return;
        }
        self.flush_word();
        self.ops.extend_from_slice(format!("{} Tw\n", gap).as_bytes());
        self.word_gap = gap;
    }

    pub fn set_horizontal(&mut self, e: Fixed) {
        self.flush_word();
        self.e = e;
        self.emit_tm();
    }

    pub fn advance_horizontal(&mut self, dx: Fixed) {
        self.flush_word();
        self.e = self.e.add(dx);
        self.emit_tm();
    }

    pub fn set_vertical(&mut self, f: Fixed) {
        self.flush_word();
        self.f = f;
        self.emit_tm();
    }

    /// Append glyph bytes and advance `e` by their summed widths.
    pub fn append_word(&mut self, bytes: &[u8], advance: Fixed) {
        self.word.extend_from_slice(bytes);
        self.e = self.e.add(advance);
    }

    /// Append glyph bytes without moving the cursor. Used for special
    /// glyphs, whose advance arrives as an explicit motion command.
    pub fn append_word_without_move(&mut self, bytes: &[u8]) {
        self.word.extend_from_slice(bytes);
    }

    pub fn newline(&mut self) {
        self.flush_word();
    }

    fn emit_tm(&mut self) {
        if self.last_tm == Some((self.e, self.f)) {
            return;
        }
        self.ops
            .extend_from_slice(format!("1 0 0 1 {} {} Tm\n", self.e, self.f).as_bytes());
        self.last_tm = Some((self.e, self.f));
    }

    fn flush_word(&mut self) {
        if self.word.is_empty() {
            return;
        }
        write_tj(&mut self.ops, &self.word);
        self.word.clear();
    }

    /// The finished text object, `BT` through `ET`. A word still in the
    /// buffer is flushed into the rendering; the builder is not consumed so
    /// serialization stays read-only over the document.
    pub fn render(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.ops.len() + self.word.len() + 16);
        out.extend_from_slice(b"BT\n");
        out.extend_from_slice(&self.ops);
        if !self.word.is_empty() {
            write_tj(&mut out, &self.word);
        }
        out.extend_from_slice(b"ET\n");
        out
    }
}

fn write_tj(out: &mut Vec<u8>, word: &[u8]) {
    out.push(b'(');
    for &b in word {
        if matches!(b, b'(' | b')' | b'\\') {
            out.push(b'\\');
        }
        out.push(b);
    }
    out.extend_from_slice(b") Tj\n");
}
