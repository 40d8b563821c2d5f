pub mod paths;
pub mod text;

pub use paths::{display_path_rel_to_cwd, is_binary_file, resolve_path};
pub use text::{count_tokens, truncate_text};
