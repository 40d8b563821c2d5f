pub mod read_file;
pub mod shell;
pub mod write_file;

pub use read_file::{ReadFileParameters, ReadFileTool};
pub use shell::ShellTool;
pub use write_file::WriteFileTool;
