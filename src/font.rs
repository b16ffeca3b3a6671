use std::{
    collections::HashMap,
    env, fs, io,
    path::{Path, PathBuf},
};

use once_cell::sync::Lazy;

use crate::error::{DriverError, PdfResult};

/// The 14 standard Type-1 fonts by their device short name. These are
/// referenced by name in the output, never embedded.
static BASE_FONTS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("TR", "Times-Roman"),
        ("TI", "Times-Italic"),
        ("TB", "Times-Bold"),
        ("TBI", "Times-BoldItalic"),
        ("CR", "Courier"),
        ("CI", "Courier-Oblique"),
        ("CB", "Courier-Bold"),
        ("CBI", "Courier-BoldOblique"),
        ("HR", "Helvetica"),
        ("HI", "Helvetica-Oblique"),
        ("HB", "Helvetica-Bold"),
        ("HBI", "Helvetica-BoldOblique"),
        ("S", "Symbol"),
        ("ZD", "ZapfDingbats"),
    ])
});

/// Roots searched for the device's font description directory.
const FONT_ROOTS: &[&str] = &[
    "/usr/share/groff/current",
    "/usr/local/share/groff/current",
    "/opt/homebrew/share/groff/current",
];

/// Directories to search for description files, most specific first.
/// `GROFF_FONT_PATH` entries are searched before the fixed roots.
pub fn default_search_path() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(paths) = env::var_os("GROFF_FONT_PATH") {
        for p in env::split_paths(&paths) {
            dirs.push(p.join("devpdf"));
        }
    }
    for root in FONT_ROOTS {
        dirs.push(Path::new(root).join("font/devpdf"));
    }
    dirs
}

/// Advance widths in font units, densely indexed by character code.
/// Zero where the description file says nothing.
#[derive(Clone, Debug)]
pub struct WidthTable([u32; 257]);

impl WidthTable {
    pub fn get(&self, code: u8) -> u32 {
        self.0[usize::from(code)]
    }
}

#[derive(Debug)]
pub struct FontDescription {
    /// PostScript name used for `/BaseFont`.
    pub base_font: String,
    pub widths: WidthTable,
}

/// Locate and parse the description file for a short font name.
pub fn load(short: &str, search: &[PathBuf]) -> PdfResult<FontDescription> {
    for dir in search {
        let path = dir.join(short);
        match fs::read_to_string(&path) {
            Ok(text) => return parse_description(short, &text),
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            // a directory component that is not a directory reads as
            // NotADirectory on some platforms; treat it as absent too
            Err(err) if err.kind() == io::ErrorKind::NotADirectory => continue,
            Err(err) => return Err(err.into()),
        }
    }
    anyhow::bail!(DriverError::FontNotFound {
        name: short.to_owned(),
        searched: search.to_vec(),
    })
}

/// Parse a device description file.
///
/// Everything before the line `charset` is header; only an `internalname`
/// entry is consulted, to override the static short-name table. From
/// `charset` on, each line describes one glyph as tab-separated
/// `name metrics type code comment` fields. A metrics field of `"` marks a
/// continuation line (another name for the previous glyph) and is skipped.
/// The first comma-separated token of the metrics field is the advance
/// width; the code field is the character code.
fn parse_description(short: &str, text: &str) -> PdfResult<FontDescription> {
    let mut widths = [0_u32; 257];
    let mut internal_name: Option<String> = None;
    let mut in_charset = false;

    for (idx, line) in text.lines().enumerate() {
        let number = idx + 1;
        if !in_charset {
            if line.trim() == "charset" {
                in_charset = true;
            } else if let Some(name) = line.strip_prefix("internalname ") {
                internal_name = Some(name.trim().to_owned());
            }
            continue;
        }

        if line.is_empty() {
            continue;
        }
        let mut fields = line.split('\t');
        let _name = fields.next();
        let Some(metrics) = fields.next() else {
            anyhow::bail!(DriverError::Parse {
                line: number,
                what: format!("font `{}`: glyph line has no metrics field", short),
            });
        };
        if metrics == "\"" {
            continue;
        }
        let (_type, code) = (fields.next(), fields.next());
        let Some(code) = code else {
            anyhow::bail!(DriverError::Parse {
                line: number,
                what: format!("font `{}`: glyph line has no code field", short),
            });
        };

        let width_token = metrics.split(',').next().unwrap_or(metrics);
        let width = width_token.parse::<u32>().map_err(|_| {
            anyhow::anyhow!(DriverError::Parse {
                line: number,
                what: format!("font `{}`: bad glyph width `{}`", short, width_token),
            })
        })?;
        let code = code.trim().parse::<usize>().ok().filter(|&c| c < widths.len());
        let Some(code) = code else {
            anyhow::bail!(DriverError::Parse {
                line: number,
                what: format!("font `{}`: bad character code on glyph line", short),
            });
        };
        widths[code] = width;
    }

    let base_font = match internal_name {
        Some(name) => name,
        None => match BASE_FONTS.get(short) {
            Some(&name) => name.to_owned(),
            None => anyhow::bail!(DriverError::Parse {
                line: 0,
                what: format!(
                    "font `{}` is not a standard base font and its description \
                     carries no internalname",
                    short
                ),
            }),
        },
    };

    Ok(FontDescription {
        base_font,
        widths: WidthTable(widths),
    })
}
