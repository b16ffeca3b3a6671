use crate::{
    fixed::Fixed,
    objects::{
        DocFontHandle, FontObject, IndirectObject, PageFontHandle, PageObject, Payload, Reference,
        StreamObject,
    },
    text::TextBuilder,
};

/// The in-memory object graph.
///
/// Objects live in a flat vector whose index is the object number minus
/// one; parent/child links are stored as [`Reference`] numbers, so the
/// page-tree cycle never materializes as pointers. Insertion order is
/// emission order. The Pages root and the Catalog exist from construction;
/// a document without pages is valid and serializes as an empty PDF.
#[derive(Debug)]
pub struct Document {
    objects: Vec<IndirectObject>,
    pages_root: Reference,
    catalog: Reference,
    /// Document-scope fonts, indexed by [`DocFontHandle`].
    fonts: Vec<Reference>,
}

impl Document {
    pub fn new() -> Self {
        let mut doc = Document {
            objects: Vec::new(),
            pages_root: Reference(0),
            catalog: Reference(0),
            fonts: Vec::new(),
        };
        doc.pages_root = doc.alloc(Payload::Pages { kids: Vec::new() });
        doc.catalog = doc.alloc(Payload::Catalog {
            pages: doc.pages_root,
        });
        doc
    }

    fn alloc(&mut self, payload: Payload) -> Reference {
        let number = self.objects.len() as u32 + 1;
        self.objects.push(IndirectObject { number, payload });
        Reference(number)
    }

    pub fn objects(&self) -> &[IndirectObject] {
        &self.objects
    }

    pub fn catalog(&self) -> Reference {
        self.catalog
    }

    pub fn pages_root(&self) -> Reference {
        self.pages_root
    }

    fn payload_mut(&mut self, r: Reference) -> &mut Payload {
        &mut self.objects[r.0 as usize - 1].payload
    }

    fn payload(&self, r: Reference) -> &Payload {
        &self.objects[r.0 as usize - 1].payload
    }

    /// Register a font at document scope.
    pub fn register_font(&mut self, base_font: String) -> DocFontHandle {
        let font = self.alloc(Payload::Font(FontObject { base_font }));
        self.fonts.push(font);
        DocFontHandle(self.fonts.len() - 1)
    }

    /// Reference a document font from a page, allocating that page's next
    /// resource slot on first use. At most one slot exists per document
    /// font per page.
    pub fn add_page_font(&mut self, page: Reference, font: DocFontHandle) -> PageFontHandle {
        let font_ref = self.fonts[font.0];
        match self.payload_mut(page) {
            Payload::Page(p) => match p.font_slots.iter().position(|&r| r == font_ref) {
                Some(slot) => PageFontHandle(slot),
                None => {
                    p.font_slots.push(font_ref);
                    PageFontHandle(p.font_slots.len() - 1)
                }
            },
            _ => unreachable!("page handle does not point at a page"),
        }
    }

    /// Allocate a page and its content stream; the page is appended to the
    /// page tree. Returns the page and stream references.
    pub fn new_page(&mut self, width: Fixed, height: Fixed) -> (Reference, Reference) {
        let contents = self.alloc(Payload::Stream(StreamObject {
            text: TextBuilder::new(),
        }));
        let parent = self.pages_root;
        let page = self.alloc(Payload::Page(PageObject {
            parent,
            contents,
            media_width: width,
            media_height: height,
            font_slots: Vec::new(),
        }));
        match self.payload_mut(parent) {
            Payload::Pages { kids } => kids.push(page),
            _ => unreachable!("pages root does not point at a page tree"),
        }
        (page, contents)
    }

    pub fn set_media_box(&mut self, page: Reference, width: Fixed, height: Fixed) {
        match self.payload_mut(page) {
            Payload::Page(p) => {
                p.media_width = width;
                p.media_height = height;
            }
            _ => unreachable!("page handle does not point at a page"),
        }
    }

    pub fn text_builder_mut(&mut self, stream: Reference) -> &mut TextBuilder {
        match self.payload_mut(stream) {
            Payload::Stream(s) => &mut s.text,
            _ => unreachable!("stream handle does not point at a stream"),
        }
    }

    pub fn page(&self, page: Reference) -> &PageObject {
        match self.payload(page) {
            Payload::Page(p) => p,
            _ => unreachable!("page handle does not point at a page"),
        }
    }
}
