use std::io::{self, Write};

use crate::{
    document::Document,
    error::PdfResult,
    fixed::Fixed,
    objects::{PageObject, Payload},
};

/// Counts bytes as they pass through so object offsets and `startxref` are
/// exact. A reader that seeks to a recorded offset must land on the first
/// byte of the object header.
pub struct CountingWriter<W: Write> {
    inner: W,
    written: u64,
}

impl<W: Write> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        CountingWriter { inner, written: 0 }
    }

    /// Bytes written so far, measured from the start of the file.
    pub fn position(&self) -> u64 {
        self.written
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.written += written as u64;
        Ok(written)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.inner.write_all(buf)?;
        self.written += buf.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Serialize the object graph as a classic PDF 1.1 file: header, body in
/// insertion order, one cross-reference section, trailer.
pub fn write_document<W: Write>(doc: &Document, output: W) -> PdfResult<()> {
    let mut out = CountingWriter::new(output);
    out.write_all(b"%PDF-1.1\n")?;
    // high-bit bytes mark the file as binary for transports that sniff
    out.write_all(b"%\xB5\xED\xAE\xFB\n")?;

    let mut offsets = Vec::with_capacity(doc.objects().len());
    for obj in doc.objects() {
        offsets.push(out.position());
        log::debug!("object {} at offset {}", obj.number, out.position());
        write!(out, "{} 0 obj\n", obj.number)?;
        write_payload(&mut out, &obj.payload)?;
        out.write_all(b"endobj\n")?;
    }

    let startxref = out.position();
    write!(out, "xref\n0 {}\n", offsets.len() + 1)?;
    // object 0 heads the free list; no other object is ever free here
    out.write_all(b"0000000000 65535 f \n")?;
    for offset in &offsets {
        write!(out, "{:010} 00000 n \n", offset)?;
    }

    write!(
        out,
        "trailer\n<< /Root {} /Size {} >>\n",
        doc.catalog(),
        offsets.len() + 1
    )?;
    write!(out, "startxref\n{}\n%%EOF\n", startxref)?;
    out.flush()?;
    Ok(())
}

fn write_payload<W: Write>(out: &mut CountingWriter<W>, payload: &Payload) -> PdfResult<()> {
    match payload {
        Payload::Catalog { pages } => {
            write!(out, "<< /Type /Catalog /Pages {} >>\n", pages)?;
        }
        Payload::Pages { kids } => {
            out.write_all(b"<< /Type /Pages /Kids [")?;
            for (i, kid) in kids.iter().enumerate() {
                if i > 0 {
                    out.write_all(b" ")?;
                }
                write!(out, "{}", kid)?;
            }
            write!(out, "] /Count {} >>\n", kids.len())?;
        }
        Payload::Page(page) => write_page(out, page)?,
        Payload::Font(font) => {
            write!(
                out,
                "<< /Type /Font /BaseFont /{} /Subtype /Type1 >>\n",
                font.base_font
            )?;
        }
        Payload::Stream(stream) => {
            // the body is materialized first so /Length is exact
            let data = stream.text.render();
            write!(out, "<< /Length {} >>\nstream\n", data.len())?;
            out.write_all(&data)?;
            out.write_all(b"\nendstream\n")?;
        }
    }
    Ok(())
}

fn write_page<W: Write>(out: &mut CountingWriter<W>, page: &PageObject) -> PdfResult<()> {
    write!(
        out,
        "<< /Type /Page /Parent {} /Contents {} /MediaBox [0 0 ",
        page.parent, page.contents
    )?;
    write_dim(out, page.media_width)?;
    out.write_all(b" ")?;
    write_dim(out, page.media_height)?;
    out.write_all(b"]")?;
    if !page.font_slots.is_empty() {
        out.write_all(b" /Resources << /Font <<")?;
        for (slot, font) in page.font_slots.iter().enumerate() {
            write!(out, " /F{} {}", slot, font)?;
        }
        out.write_all(b" >> >>")?;
    }
    out.write_all(b" >>\n")?;
    Ok(())
}

/// Media-box entries print as bare integers for whole point sizes, which
/// is the common case; fractional paper sizes keep their three digits.
fn write_dim<W: Write>(out: &mut CountingWriter<W>, dim: Fixed) -> io::Result<()> {
    if dim.fraction() == 0 {
        write!(out, "{}", dim.integer())
    } else {
        write!(out, "{}", dim)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_document() -> Document {
        let mut doc = Document::new();
        let font = doc.register_font("Times-Roman".to_owned());
        let (page, contents) = doc.new_page(Fixed::new(612, 0), Fixed::new(792, 0));
        let slot = doc.add_page_font(page, font);
        let text = doc.text_builder_mut(contents);
        text.select_font(slot, 11);
        text.set_horizontal(Fixed::new(72, 0));
        text.append_word(b"hello", Fixed::new(22, 0));
        doc
    }

    fn write_to_vec(doc: &Document) -> Vec<u8> {
        let mut out = Vec::new();
        write_document(doc, &mut out).unwrap();
        out
    }

    fn find(haystack: &[u8], needle: &[u8]) -> usize {
        haystack
            .windows(needle.len())
            .position(|w| w == needle)
            .unwrap_or_else(|| panic!("{:?} not found", String::from_utf8_lossy(needle)))
    }

    #[test]
    fn header_marks_the_file_as_binary() {
        let out = write_to_vec(&sample_document());
        assert!(out.starts_with(b"%PDF-1.1\n%"));
        let comment = &out[10..14];
        assert!(comment.iter().all(|&b| b >= 0x80), "{:?}", comment);
    }

    #[test]
    fn xref_offsets_locate_every_object() {
        let out = write_to_vec(&sample_document());
        let xref = find(&out, b"xref\n");
        let table = std::str::from_utf8(&out[xref..]).unwrap();
        let mut lines = table.lines();
        assert_eq!(lines.next(), Some("xref"));

        let (start, count) = lines.next().unwrap().split_once(' ').unwrap();
        assert_eq!(start, "0");
        let count: usize = count.parse().unwrap();

        assert_eq!(lines.next(), Some("0000000000 65535 f "));
        for number in 1..count {
            let entry = lines.next().unwrap();
            let offset: usize = entry[..10].parse().unwrap();
            assert!(entry.ends_with("00000 n "), "{entry:?}");
            let header = format!("{} 0 obj\n", number);
            assert_eq!(
                &out[offset..offset + header.len()],
                header.as_bytes(),
                "object {} is not at its declared offset",
                number
            );
        }
    }

    #[test]
    fn startxref_points_at_the_xref_keyword() {
        let out = write_to_vec(&sample_document());
        let text = String::from_utf8_lossy(&out);
        let value: usize = text
            .rsplit_once("startxref\n")
            .unwrap()
            .1
            .lines()
            .next()
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(&out[value..value + 4], b"xref");
    }

    #[test]
    fn trailer_size_counts_objects_plus_free_entry() {
        let doc = sample_document();
        let out = write_to_vec(&doc);
        let expected = format!("/Size {}", doc.objects().len() + 1);
        assert!(String::from_utf8_lossy(&out).contains(&expected));
    }

    #[test]
    fn stream_length_is_exact() {
        let out = write_to_vec(&sample_document());
        let text = String::from_utf8_lossy(&out);
        let (_, after) = text.split_once("/Length ").unwrap();
        let length: usize = after.split_once(' ').unwrap().0.parse().unwrap();

        let data_start = find(&out, b"stream\n") + b"stream\n".len();
        let data_end = find(&out, b"\nendstream");
        assert_eq!(data_end - data_start, length);
    }

    #[test]
    fn every_reference_resolves() {
        let doc = sample_document();
        let out = write_to_vec(&doc);
        let text = String::from_utf8_lossy(&out);
        for (i, _) in text.match_indices(" 0 R") {
            let number: String = text[..i]
                .chars()
                .rev()
                .take_while(char::is_ascii_digit)
                .collect();
            let number: u32 = number.chars().rev().collect::<String>().parse().unwrap();
            assert!(text.contains(&format!("{} 0 obj", number)));
        }
    }

    #[test]
    fn page_dictionary_lists_parent_contents_and_resources() {
        let out = write_to_vec(&sample_document());
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("/Type /Page "), "{text}");
        assert!(text.contains("/Parent 1 0 R"));
        assert!(text.contains("/MediaBox [0 0 612 792]"));
        assert!(text.contains("/Resources << /Font << /F0 3 0 R >> >>"));
    }

    #[test]
    fn fractional_media_box_keeps_its_digits() {
        let mut doc = Document::new();
        doc.new_page(Fixed::new(595, 500), Fixed::new(842, 0));
        let out = write_to_vec(&doc);
        assert!(String::from_utf8_lossy(&out).contains("/MediaBox [0 0 595.500 842]"));
    }

    #[test]
    fn empty_document_is_still_a_valid_pdf() {
        let out = write_to_vec(&Document::new());
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("/Type /Pages /Kids [] /Count 0"));
        assert!(text.contains("/Type /Catalog"));
        assert!(text.ends_with("%%EOF\n"));
    }
}
