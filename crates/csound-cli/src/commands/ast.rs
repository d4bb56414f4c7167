use std::io::Write;

use csound_api::{Engine, Host, InstanceId};

use crate::error::CliError;
use crate::present::{group_next_nodes, outline};

/// Parses `orchestra` and prints its syntax tree, as an outline or as grouped JSON.
pub fn handle_ast<E: Engine>(
    host: &Host<E>,
    id: InstanceId,
    orchestra: &str,
    json: bool,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let Some(mut tree) = host.parse_orc(id, orchestra)? else {
        return Err(CliError::ParseFailed);
    };
    let rendered = if json {
        serde_json::to_string_pretty(&group_next_nodes(tree.root())).map_err(CliError::from)
    } else {
        Ok(outline(tree.root()))
    };
    // The copy is independent of the native tree, so release it before reporting.
    host.delete_tree(id, &mut tree)?;
    writeln!(out, "{}", rendered?.trim_end()).map_err(CliError::Output)
}
