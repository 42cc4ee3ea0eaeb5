use std::error::Error;

use tabled::settings::{Panel, Style};
use tabled::{Table, Tabled};

use crate::{
    cli::capture::{parse_hex, to_hex},
    drivers::synaptics_tcm::report_config::ReportProgram,
};

#[derive(Tabled)]
struct InstructionRow {
    #[tabled(rename = "Index")]
    index: usize,
    #[tabled(rename = "Instruction")]
    instruction: String,
    #[tabled(rename = "Loop")]
    loop_start: String,
}

/// Decode a hex encoded touch report config and print its instructions
pub fn handle_disasm(hex: String) -> Result<(), Box<dyn Error>> {
    let data = parse_hex(hex.as_str())?;
    let program = ReportProgram::decode(&data)?;

    let rows = program
        .instructions()
        .iter()
        .enumerate()
        .map(|(index, instruction)| InstructionRow {
            index,
            instruction: instruction.to_string(),
            loop_start: program
                .enclosing_loop(index)
                .map(|info| info.start.to_string())
                .unwrap_or_default(),
        });
    let mut table = Table::new(rows);
    table
        .with(Style::modern_rounded())
        .with(Panel::header("Touch Report Config"));
    println!("{table}");

    Ok(())
}

/// Print the default touch report config padded to the given size
pub fn handle_default_config(double_tap: bool, size: usize) -> Result<(), Box<dyn Error>> {
    let program = ReportProgram::default_config(double_tap);
    let data = program.encode_padded(size)?;
    log::debug!("Default touch report config:\n{program}");
    println!("{}", to_hex(&data));

    Ok(())
}
