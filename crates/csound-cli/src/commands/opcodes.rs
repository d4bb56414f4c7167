use std::io::Write;

use csound_api::{Engine, Host, InstanceId, OpcodeEntry, Status};

use crate::error::{expect_success, CliError};

/// Prints every opcode as `name  outputs  inputs`, aligned.
pub fn handle_opcodes<E: Engine>(
    host: &Host<E>,
    id: InstanceId,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let (count, mut list) = host.new_opcode_list(id)?;
    if count < 0 {
        expect_success("new_opcode_list", Status::from(count))?;
    }
    let table = format_opcodes(list.items());
    host.dispose_opcode_list(id, &mut list)?;

    log::debug!("Listed {} opcodes.", count);
    out.write_all(table.as_bytes()).map_err(CliError::Output)
}

fn format_opcodes(entries: &[OpcodeEntry]) -> String {
    let name_width = entries.iter().map(|entry| entry.name.len()).max().unwrap_or(0);
    let output_width =
        entries.iter().map(|entry| display_types(&entry.output_types).len()).max().unwrap_or(0);
    entries
        .iter()
        .map(|entry| {
            let line = format!(
                "{:name_width$}  {:output_width$}  {}",
                entry.name,
                display_types(&entry.output_types),
                display_types(&entry.input_types),
            );
            format!("{}\n", line.trim_end())
        })
        .collect()
}

fn display_types(types: &str) -> &str {
    if types.is_empty() {
        "(none)"
    } else {
        types
    }
}
