mod classes;
mod decode;
mod result;

pub use classes::{ClassTable, LabelOffset};
pub use decode::{Formatter, OutputFormat};
pub use result::{BBox, Detection, RECORD_LEN};
