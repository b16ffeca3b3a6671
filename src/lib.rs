/*!
Backend output device for a typesetting front-end: reads the line-oriented
intermediate output language on one end and writes a self-contained PDF 1.1
file on the other.

The pipeline is fully synchronous: input lines feed the interpreter in
[`interp`], which drives the object graph in [`document`]; a single
finalization pass in [`serialize`] emits the bytes with exact
cross-reference offsets.
*/

pub mod document;
pub mod error;
pub mod fixed;
pub mod font;
pub mod grout;
pub mod interp;
pub mod objects;
pub mod serialize;
pub mod text;

pub use crate::{
    error::{DriverError, PdfResult},
    interp::{run, Settings},
};
