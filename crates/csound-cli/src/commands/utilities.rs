use std::io::Write;

use csound_api::{Engine, Host, InstanceId};

use crate::error::CliError;

/// Prints each registered utility with its description.
pub fn handle_utilities<E: Engine>(
    host: &Host<E>,
    id: InstanceId,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let mut list = host.list_utilities(id)?;
    let names = list.items().to_vec();
    host.delete_utility_list(id, &mut list)?;

    let width = names.iter().map(String::len).max().unwrap_or(0);
    let mut text = String::new();
    for name in &names {
        match host.utility_description(id, name)? {
            Some(description) => text.push_str(&format!("{name:width$}  {description}\n")),
            None => text.push_str(&format!("{name}\n")),
        }
    }
    out.write_all(text.as_bytes()).map_err(CliError::Output)
}
