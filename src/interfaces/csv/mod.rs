pub mod project_reader;
pub mod report_writer;

pub use project_reader::ProjectReader;
pub use report_writer::ReportWriter;
