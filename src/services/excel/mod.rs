pub mod analyzer;
pub mod processor;
pub mod utils;
pub mod writer;

pub use analyzer::preview_workbook;
pub use processor::{read_sheet, read_workbook};
pub use utils::{tables_file_name, updated_file_name};
pub use writer::write_workbook;
