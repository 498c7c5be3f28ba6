pub mod console_oracle;
pub mod csv_input;
pub mod output;

pub use console_oracle::ConsoleOracle;
pub use csv_input::{read_csv, InputTable};
pub use output::write_results;
