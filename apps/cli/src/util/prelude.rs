pub use crate::print_output;
pub use crate::util::output::exit_code;
