use std::{
    collections::HashMap,
    io::{BufRead, Write},
    path::PathBuf,
};

use once_cell::sync::Lazy;

use crate::{
    document::Document,
    error::{DriverError, PdfResult},
    fixed::Fixed,
    font::{self, WidthTable},
    grout::{self, Command, Control},
    objects::{DocFontHandle, PageFontHandle, Reference},
    serialize,
    text::TextBuilder,
};

/// Glyph bytes for the special-character names the device understands.
static SPECIAL_GLYPHS: Lazy<HashMap<&'static str, u8>> = Lazy::new(|| {
    HashMap::from([
        ("hy", 45),
        ("lq", 141),
        ("rq", 142),
        ("fi", 174),
        ("fl", 175),
        ("cq", 169),
    ])
});

const DEFAULT_TYPE_SIZE: u32 = 11;

/// US Letter, in points, until a `papersize` escape overrides it.
const DEFAULT_PAGE_WIDTH: u32 = 612;
const DEFAULT_PAGE_HEIGHT: u32 = 792;

/// Runtime configuration, threaded through the run explicitly.
pub struct Settings {
    /// Directories searched for font description files, in order.
    pub font_search_path: Vec<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            font_search_path: font::default_search_path(),
        }
    }
}

/// Translate intermediate output into a PDF.
///
/// Reads `input` line by line until end-of-input or an empty line, then
/// serializes the accumulated document to `output` in one pass. Malformed
/// lines are logged with their line number and skipped; wrong-device,
/// missing-font, state and I/O failures abort before any output byte is
/// written.
pub fn run<R: BufRead, W: Write>(mut input: R, output: W, settings: Settings) -> PdfResult<()> {
    let mut interp = Interpreter::new(settings);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if input.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
        }
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        // an empty line terminates the input
        if buf.is_empty() {
            break;
        }
        interp.line += 1;

        let result = grout::parse_line(&buf, interp.line).and_then(|cmd| match cmd {
            Some(cmd) => interp.dispatch(cmd),
            None => Ok(()),
        });
        if let Err(err) = result {
            // a skippable malformed line never alters the output
            if matches!(err.downcast_ref::<DriverError>(), Some(DriverError::Parse { .. })) {
                log::warn!("{err}");
                continue;
            }
            return Err(err);
        }
    }
    interp.finish(output)
}

/// The command dispatcher.
///
/// Observable states: pre-document (no `x init` yet), in-document without a
/// page, and in-page. All device state lives here, including the unit
/// scale set by `x res`, which every coordinate conversion divides by.
struct Interpreter {
    settings: Settings,
    doc: Option<Document>,
    /// Device units per PDF user-space unit.
    unit_scale: u32,
    /// Device font slot (from `x font N`) to document font.
    doc_fonts: HashMap<u32, DocFontHandle>,
    /// Width tables, parallel to the document font list.
    width_tables: Vec<WidthTable>,
    /// Device font slot to this page's resource slot; rebuilt per page as
    /// fonts are referenced.
    page_fonts: HashMap<u32, PageFontHandle>,
    page: Option<Reference>,
    stream: Option<Reference>,
    /// Device slot of the current font.
    font: Option<u32>,
    doc_font: Option<DocFontHandle>,
    /// The current font's slot on the current page; cleared at `p` so the
    /// first reference on each page re-emits its selection.
    page_font: Option<PageFontHandle>,
    /// Type size in points.
    size: u32,
    page_width: Fixed,
    page_height: Fixed,
    /// 1-based input line, for diagnostics.
    line: usize,
}

impl Interpreter {
    fn new(settings: Settings) -> Self {
        Interpreter {
            settings,
            doc: None,
            unit_scale: 1,
            doc_fonts: HashMap::new(),
            width_tables: Vec::new(),
            page_fonts: HashMap::new(),
            page: None,
            stream: None,
            font: None,
            doc_font: None,
            page_font: None,
            size: DEFAULT_TYPE_SIZE,
            page_width: Fixed::new(DEFAULT_PAGE_WIDTH, 0),
            page_height: Fixed::new(DEFAULT_PAGE_HEIGHT, 0),
            line: 0,
        }
    }

    fn dispatch(&mut self, cmd: Command) -> PdfResult<()> {
        match cmd {
            Command::Control(ctl) => self.control(ctl),
            Command::BeginPage => self.begin_page(),
            Command::SelectFont(slot) => self.select_font(slot),
            Command::TypeSize(scaled) => self.type_size(scaled),
            Command::Word(bytes) => self.word(bytes),
            Command::SpecialGlyph(name) => self.special(name),
            Command::MoveRight(scaled) => self.move_right(scaled),
            Command::AbsHorizontal(scaled) => self.abs_horizontal(scaled),
            Command::AbsVertical(scaled) => self.abs_vertical(scaled),
            Command::InterWord(inner) => self.inter_word(*inner),
            Command::Newline => self.newline(),
            Command::MoveDown => {
                log::warn!(
                    "line {}: relative vertical motion is not supported; ignoring",
                    self.line
                );
                Ok(())
            }
            Command::Draw | Command::Color => {
                log::debug!("line {}: drawing and color are not supported", self.line);
                Ok(())
            }
        }
    }

    fn control(&mut self, ctl: Control) -> PdfResult<()> {
        match ctl {
            Control::Typesetter(name) => {
                if name != "pdf" {
                    anyhow::bail!(DriverError::WrongDevice {
                        found: name.to_owned(),
                    });
                }
                Ok(())
            }
            Control::Resolution(res) => {
                if res < 72 {
                    anyhow::bail!(DriverError::Parse {
                        line: self.line,
                        what: format!("resolution {} is below 72 units per inch", res),
                    });
                }
                // PDF user space runs at 72 units per inch
                self.unit_scale = res / 72;
                Ok(())
            }
            Control::Init => {
                if self.doc.is_some() {
                    log::warn!("line {}: duplicate `x init` ignored", self.line);
                } else {
                    self.doc = Some(Document::new());
                }
                Ok(())
            }
            Control::MountFont { slot, short } => self.mount_font(slot, short),
            Control::PaperSize { width, height } => {
                let width = Fixed::from_ratio(width, self.unit_scale);
                let height = Fixed::from_ratio(height, self.unit_scale);
                self.page_width = width;
                self.page_height = height;
                if let (Some(doc), Some(page)) = (self.doc.as_mut(), self.page) {
                    doc.set_media_box(page, width, height);
                }
                Ok(())
            }
            Control::Trailer | Control::Stop => Ok(()),
        }
    }

    /// `x font N SHORT`: load the width table, register the font at
    /// document scope, and give it a slot on the current page if one is
    /// open.
    fn mount_font(&mut self, slot: u32, short: &str) -> PdfResult<()> {
        let line = self.line;
        let Some(doc) = self.doc.as_mut() else {
            anyhow::bail!(DriverError::StateViolation {
                line,
                command: 'x',
                needs: "an `x init` before mounting fonts",
            });
        };
        let desc = font::load(short, &self.settings.font_search_path)?;
        log::debug!("mounting `{}` ({}) at slot {}", short, desc.base_font, slot);

        let handle = doc.register_font(desc.base_font);
        self.width_tables.push(desc.widths);
        if let Some(page) = self.page {
            let page_font = doc.add_page_font(page, handle);
            self.page_fonts.insert(slot, page_font);
        }
        self.doc_fonts.insert(slot, handle);
        Ok(())
    }

    fn begin_page(&mut self) -> PdfResult<()> {
        let line = self.line;
        let (width, height) = (self.page_width, self.page_height);
        let Some(doc) = self.doc.as_mut() else {
            anyhow::bail!(DriverError::StateViolation {
                line,
                command: 'p',
                needs: "an `x init` to begin the document",
            });
        };
        let (page, stream) = doc.new_page(width, height);
        self.page = Some(page);
        self.stream = Some(stream);
        self.page_fonts.clear();
        self.page_font = None;
        Ok(())
    }

    fn select_font(&mut self, slot: u32) -> PdfResult<()> {
        let line = self.line;
        let Some(&handle) = self.doc_fonts.get(&slot) else {
            anyhow::bail!(DriverError::StateViolation {
                line,
                command: 'f',
                needs: "a font mounted at this slot with `x font`",
            });
        };
        self.font = Some(slot);
        self.doc_font = Some(handle);
        // selection always re-emits, even for the same font
        self.page_font = None;
        self.ensure_page_font('f')?;
        Ok(())
    }

    /// The current font's slot on the current page, registering it and
    /// emitting its selection on first reference after a page break.
    fn ensure_page_font(&mut self, command: char) -> PdfResult<(DocFontHandle, PageFontHandle)> {
        let line = self.line;
        let Some(handle) = self.doc_font else {
            anyhow::bail!(DriverError::StateViolation {
                line,
                command,
                needs: "an `f` to select a font",
            });
        };
        if let Some(page_font) = self.page_font {
            return Ok((handle, page_font));
        }
        let (Some(doc), Some(page), Some(stream), Some(slot)) =
            (self.doc.as_mut(), self.page, self.stream, self.font)
        else {
            anyhow::bail!(DriverError::StateViolation {
                line,
                command,
                needs: "a `p` to begin a page",
            });
        };
        let page_font = match self.page_fonts.get(&slot) {
            Some(&page_font) => page_font,
            None => {
                let page_font = doc.add_page_font(page, handle);
                self.page_fonts.insert(slot, page_font);
                page_font
            }
        };
        doc.text_builder_mut(stream).select_font(page_font, self.size);
        self.page_font = Some(page_font);
        Ok((handle, page_font))
    }

    fn builder_mut(&mut self, command: char) -> PdfResult<&mut TextBuilder> {
        let line = self.line;
        match (self.doc.as_mut(), self.stream) {
            (Some(doc), Some(stream)) => Ok(doc.text_builder_mut(stream)),
            _ => anyhow::bail!(DriverError::StateViolation {
                line,
                command,
                needs: "a `p` to begin a page",
            }),
        }
    }

    fn type_size(&mut self, scaled: u32) -> PdfResult<()> {
        self.size = scaled / self.unit_scale;
        // re-select the current font at the new size
        if let (Some(doc), Some(stream), Some(page_font)) =
            (self.doc.as_mut(), self.stream, self.page_font)
        {
            doc.text_builder_mut(stream).select_font(page_font, self.size);
        }
        Ok(())
    }

    fn word(&mut self, bytes: &[u8]) -> PdfResult<()> {
        let (handle, _) = self.ensure_page_font('t')?;
        let widths = &self.width_tables[handle.0];
        let mut advance = Fixed::ZERO;
        for &b in bytes {
            advance = advance.add(Fixed::from_ratio(
                widths.get(b) * self.size,
                self.unit_scale,
            ));
        }
        self.builder_mut('t')?.append_word(bytes, advance);
        Ok(())
    }

    /// `C xx`: the glyph byte goes into the word buffer without moving the
    /// cursor; the front-end always follows a special glyph with an
    /// explicit motion that carries the advance.
    fn special(&mut self, name: &str) -> PdfResult<()> {
        self.ensure_page_font('C')?;
        let line = self.line;
        let builder = self.builder_mut('C')?;
        match SPECIAL_GLYPHS.get(name) {
            Some(&glyph) => builder.append_word_without_move(&[glyph]),
            None => {
                // conservative: pass the raw name through rather than drop it
                log::warn!("line {}: unknown special glyph `{}`", line, name);
                builder.append_word_without_move(name.as_bytes());
            }
        }
        Ok(())
    }

    fn move_right(&mut self, scaled: u32) -> PdfResult<()> {
        let dx = Fixed::from_ratio(scaled, self.unit_scale);
        self.builder_mut('h')?.advance_horizontal(dx);
        Ok(())
    }

    fn abs_horizontal(&mut self, scaled: u32) -> PdfResult<()> {
        let e = Fixed::from_ratio(scaled, self.unit_scale);
        self.builder_mut('H')?.set_horizontal(e);
        Ok(())
    }

    fn abs_vertical(&mut self, scaled: u32) -> PdfResult<()> {
        let v = Fixed::from_ratio(scaled, self.unit_scale);
        let height = self.page_height;
        // the intermediate measures from the top of the page, PDF from the
        // bottom; positions beyond the page height are dropped
        if v <= height {
            self.builder_mut('V')?.set_vertical(height.subtract(v));
        } else {
            log::debug!(
                "line {}: vertical position {} is beyond the page height {}",
                self.line,
                v,
                height
            );
        }
        Ok(())
    }

    /// `w` has no effect of its own: the remainder of the line is
    /// re-dispatched as if the `w` were absent. A horizontal gap also
    /// records the inter-word width for the builder.
    fn inter_word(&mut self, inner: Command) -> PdfResult<()> {
        if let Command::MoveRight(scaled) = &inner {
            let gap = Fixed::from_ratio(*scaled, self.unit_scale);
            self.builder_mut('w')?.set_word_gap(gap);
        }
        self.dispatch(inner)
    }

    fn newline(&mut self) -> PdfResult<()> {
        self.builder_mut('n')?.newline();
        Ok(())
    }

    fn finish<W: Write>(self, output: W) -> PdfResult<()> {
        match &self.doc {
            // no `x init` ever arrived; an empty run produces no bytes
            None => Ok(()),
            Some(doc) => serialize::write_document(doc, output),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const TR: &str = "\
name TR
internalname Times-Roman
spacewidth 250
charset
h\t500,682\t2\t104\th
e\t444,460,10\t2\t101\te
l\t278,682\t2\t108\tl
o\t500,460,10\t2\t111\to
w\t722,460\t2\t119\tw
r\t333,460\t2\t114\tr
d\t500,683\t2\t100\td
hy\t333,257\t2\t45\thyphen
";

    const MINIMAL_DOCUMENT: &str = "\
x T pdf
x res 72000 1 1
x init
x font 1 TR
p 1
f1
s11000
V100000
H72000
thello
n72000 0
";

    fn font_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("TR"), TR).unwrap();
        dir
    }

    fn settings(dir: &TempDir) -> Settings {
        Settings {
            font_search_path: vec![dir.path().to_path_buf()],
        }
    }

    fn translate(input: &str) -> Vec<u8> {
        let dir = font_dir();
        let mut out = Vec::new();
        run(input.as_bytes(), &mut out, settings(&dir)).unwrap();
        out
    }

    fn translate_err(input: &str) -> (anyhow::Error, Vec<u8>) {
        let dir = font_dir();
        let mut out = Vec::new();
        let err = run(input.as_bytes(), &mut out, settings(&dir)).unwrap_err();
        (err, out)
    }

    #[test]
    fn minimal_text_document() {
        let out = translate(MINIMAL_DOCUMENT);
        let text = String::from_utf8_lossy(&out);
        assert!(out.starts_with(b"%PDF-1.1\n%"));
        assert!(text.contains("/MediaBox [0 0 612 792]"));
        assert!(text.contains("/BaseFont /Times-Roman"));
        assert!(text.contains("/Subtype /Type1"));
        assert!(text.contains("/Count 1"));
        assert!(text.contains("BT\n"));
        assert!(text.contains("/F0 11. Tf\n"));
        // V100000 at 792pt: 792 - 100 = 692
        assert!(text.contains("1 0 0 1 72.000 692.000 Tm\n"), "{text}");
        assert!(text.contains("(hello) Tj\n"));
        assert!(text.contains("ET\n"));
        // five objects plus the free entry
        assert!(text.contains("/Size 6"), "{text}");
        assert!(text.ends_with("%%EOF\n"));
    }

    #[test]
    fn output_is_deterministic() {
        assert_eq!(translate(MINIMAL_DOCUMENT), translate(MINIMAL_DOCUMENT));
    }

    #[test]
    fn papersize_escape_overrides_the_media_box() {
        let input = MINIMAL_DOCUMENT.replace("p 1\n", "x X papersize=595000z,842000z\np 1\n");
        let out = translate(&input);
        assert!(String::from_utf8_lossy(&out).contains("/MediaBox [0 0 595 842]"));
    }

    #[test]
    fn papersize_carries_over_to_later_pages() {
        let input = MINIMAL_DOCUMENT.replace("p 1\n", "x X papersize=595000z,842000z\np 1\n")
            + "p 2\nf1\nV100000\nH72000\nthello\n";
        let text = String::from_utf8_lossy(&translate(&input)).into_owned();
        assert_eq!(text.matches("/MediaBox [0 0 595 842]").count(), 2, "{text}");
    }

    #[test]
    fn special_glyph_shows_without_advancing() {
        // the hyphen byte lands in front of the word; `e` advances by the
        // width of `hello` alone (22pt at size 11), so the move afterwards
        // lands at 72 + 22 + 1
        let input = MINIMAL_DOCUMENT.replace("thello\n", "Chy\nthello\nh1000\n");
        let text = String::from_utf8_lossy(&translate(&input)).into_owned();
        assert!(text.contains("(-hello) Tj\n"), "{text}");
        assert!(text.contains("1 0 0 1 95.000 692.000 Tm\n"), "{text}");
    }

    #[test]
    fn unknown_special_glyph_passes_raw_bytes_through() {
        let input = MINIMAL_DOCUMENT.replace("thello\n", "Czz\nthello\nwh2750\n");
        let text = String::from_utf8_lossy(&translate(&input)).into_owned();
        assert!(text.contains("(zzhello) Tj\n"), "{text}");
        // the gap still advances the cursor: 72 + 22 + 2.75
        assert!(text.contains("1 0 0 1 96.750 692.000 Tm\n"), "{text}");
    }

    #[test]
    fn interword_gap_moves_the_cursor_between_words() {
        let input = MINIMAL_DOCUMENT.replace("thello\n", "thello\nwh2750\ntworld\n");
        let text = String::from_utf8_lossy(&translate(&input)).into_owned();
        let hello = text.find("(hello) Tj").unwrap();
        let matrix = text.find("1 0 0 1 96.750 692.000 Tm").unwrap();
        let world = text.find("(world) Tj").unwrap();
        assert!(hello < matrix && matrix < world, "{text}");
        assert!(text.contains("2.750 Tw\n"), "{text}");
    }

    #[test]
    fn two_pages_each_get_a_content_stream() {
        let input = MINIMAL_DOCUMENT.replace("n72000 0\n", "") + "p 2\nV100000\nH72000\ntworld\n";
        let text = String::from_utf8_lossy(&translate(&input)).into_owned();
        assert_eq!(text.matches("/Type /Page ").count(), 2, "{text}");
        assert!(text.contains("/Count 2"));
        assert!(text.contains("(hello) Tj"));
        assert!(text.contains("(world) Tj"));
        // the carried-over font re-selects on the second page
        assert_eq!(text.matches("/F0 11. Tf\n").count(), 3, "{text}");
        // seven objects plus the free entry
        assert!(text.contains("/Size 8"), "{text}");
    }

    #[test]
    fn wrong_device_aborts_without_output() {
        let (err, out) = translate_err(&MINIMAL_DOCUMENT.replace("x T pdf\n", "x T ps\n"));
        assert!(matches!(
            err.downcast_ref::<DriverError>(),
            Some(DriverError::WrongDevice { found }) if found == "ps"
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn missing_font_aborts_without_output() {
        let (err, out) = translate_err(&MINIMAL_DOCUMENT.replace("x font 1 TR\n", "x font 1 XX\n"));
        assert!(matches!(
            err.downcast_ref::<DriverError>(),
            Some(DriverError::FontNotFound { name, .. }) if name == "XX"
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn text_before_a_page_is_a_state_violation() {
        let (err, out) = translate_err("x T pdf\nx res 72000 1 1\nx init\nthello\n");
        assert!(matches!(
            err.downcast_ref::<DriverError>(),
            Some(DriverError::StateViolation { command: 't', .. })
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn page_before_init_is_a_state_violation() {
        let (err, _) = translate_err("x T pdf\nx res 72000 1 1\np 1\n");
        assert!(matches!(
            err.downcast_ref::<DriverError>(),
            Some(DriverError::StateViolation { command: 'p', .. })
        ));
    }

    #[test]
    fn empty_input_produces_no_output() {
        let mut out = Vec::new();
        run(&b""[..], &mut out, Settings::default()).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn zero_pages_still_serialize_a_valid_pdf() {
        let out = translate("x T pdf\nx res 72000 1 1\nx init\n");
        let text = String::from_utf8_lossy(&out);
        assert!(out.starts_with(b"%PDF-1.1\n"));
        assert!(text.contains("/Kids [] /Count 0"));
        assert!(text.contains("/Size 3"));
        assert!(text.ends_with("%%EOF\n"));
    }

    #[test]
    fn an_empty_line_terminates_the_input() {
        let input = MINIMAL_DOCUMENT.to_owned() + "\ntgarbage\n";
        let text = String::from_utf8_lossy(&translate(&input)).into_owned();
        assert!(text.contains("(hello) Tj"));
        assert!(!text.contains("garbage"));
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let input = MINIMAL_DOCUMENT.replace("thello\n", "q nonsense\nx frobnicate\nH abc\nthello\n");
        let text = String::from_utf8_lossy(&translate(&input)).into_owned();
        assert!(text.contains("(hello) Tj"), "{text}");
    }

    #[test]
    fn vertical_positions_beyond_the_page_are_dropped() {
        let input = MINIMAL_DOCUMENT.replace("V100000\n", "V900000\n");
        let text = String::from_utf8_lossy(&translate(&input)).into_owned();
        // the update is dropped, leaving the baseline at the origin
        assert!(text.contains("1 0 0 1 72.000 0.000 Tm\n"), "{text}");
    }

    #[test]
    fn fractional_page_heights_keep_bottom_margin_positions() {
        let input = MINIMAL_DOCUMENT
            .replace("p 1\n", "x X papersize=595000z,842500z\np 1\n")
            .replace("V100000\n", "V842300\n");
        let text = String::from_utf8_lossy(&translate(&input)).into_owned();
        assert!(text.contains("/MediaBox [0 0 595 842.500]"), "{text}");
        // 842.500 - 842.300, with the height's fraction intact
        assert!(text.contains("1 0 0 1 72.000 0.200 Tm\n"), "{text}");
    }

    #[test]
    fn relative_vertical_motion_is_ignored() {
        let input = MINIMAL_DOCUMENT.replace("V100000\n", "V100000\nv5000\n");
        let text = String::from_utf8_lossy(&translate(&input)).into_owned();
        assert!(text.contains("1 0 0 1 72.000 692.000 Tm\n"), "{text}");
    }
}
