use comfy_table::{presets, CellAlignment, ContentArrangement, Table};
use console::Style;

use scdb_ledger::LedgerState;
use scdb_types::primitives::SlotId;

/// Data table for lists (proposals, CTIPs, bundles).
pub fn data_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(headers);
    table
}

/// Key-value card without borders.
pub fn info_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn cell_right(content: impl ToString) -> comfy_table::Cell {
    comfy_table::Cell::new(content).set_alignment(CellAlignment::Right)
}

fn short_hex(bytes: &[u8]) -> String {
    let full = hex::encode(bytes);
    if full.len() <= 16 {
        full
    } else {
        format!("{}…{}", &full[..8], &full[full.len() - 8..])
    }
}

/// Summary card of the tip and state root.
pub fn summary_table(state: &LedgerState) -> Table {
    let mut table = info_table();
    match state.tip {
        Some(tip) => {
            table.add_row(vec!["Tip height".to_string(), tip.height.to_string()]);
            table.add_row(vec!["Tip hash".to_string(), hex::encode(tip.block_hash)]);
        }
        None => {
            table.add_row(vec!["Tip height".to_string(), "(empty)".to_string()]);
        }
    }
    table.add_row(vec![
        "State root".to_string(),
        hex::encode(state.state_root()),
    ]);
    table.add_row(vec![
        "Proposals".to_string(),
        state.registry.len().to_string(),
    ]);
    table.add_row(vec![
        "Pending bundles".to_string(),
        state.bundles.pending().count().to_string(),
    ]);
    table
}

/// One row per tracked proposal, optionally restricted to a slot.
pub fn proposals_table(state: &LedgerState, slot: Option<SlotId>) -> Table {
    let mut table = data_table(&[
        "Slot", "Hash", "Title", "Status", "Acks", "Proposed", "Deadline",
    ]);
    for p in state
        .registry
        .iter()
        .filter(|p| slot.map_or(true, |s| s == p.slot))
    {
        table.add_row(vec![
            cell_right(p.slot),
            comfy_table::Cell::new(short_hex(&p.proposal_hash)),
            comfy_table::Cell::new(&p.metadata.title),
            comfy_table::Cell::new(p.status.as_str()),
            cell_right(p.ack_count),
            cell_right(p.proposed_height),
            cell_right(p.deadline_height),
        ]);
    }
    table
}

pub fn ctips_table(state: &LedgerState, slot: Option<SlotId>) -> Table {
    let mut table = data_table(&["Slot", "Outpoint", "Amount"]);
    for c in state
        .ctips
        .iter()
        .filter(|c| slot.map_or(true, |s| s == c.slot))
    {
        table.add_row(vec![
            cell_right(c.slot),
            comfy_table::Cell::new(c.outpoint.to_string()),
            cell_right(c.amount),
        ]);
    }
    table
}

pub fn bundles_table(state: &LedgerState, slot: Option<SlotId>) -> Table {
    let mut table = data_table(&["Slot", "Hash", "Score", "Proposed", "Deadline", "Amount"]);
    for b in state
        .bundles
        .pending()
        .filter(|b| slot.map_or(true, |s| s == b.slot))
    {
        table.add_row(vec![
            cell_right(b.slot),
            comfy_table::Cell::new(short_hex(&b.bundle_hash)),
            cell_right(b.work_score),
            cell_right(b.proposed_height),
            cell_right(b.deadline_height),
            cell_right(b.payout.amount),
        ]);
    }
    table
}

/// Print table with 2-space left indent.
pub fn print_table(table: &Table) {
    for line in table.lines() {
        println!("  {}", line);
    }
}

/// Render the whole ledger to stdout.
pub fn print_state(state: &LedgerState, slot: Option<SlotId>) {
    let bold = Style::new().bold();

    print_table(&summary_table(state));
    println!();
    println!("  {}", bold.apply_to("Sidechain proposals"));
    print_table(&proposals_table(state, slot));
    println!();
    println!("  {}", bold.apply_to("CTIPs"));
    print_table(&ctips_table(state, slot));
    println!();
    println!("  {}", bold.apply_to("Pending withdrawal bundles"));
    print_table(&bundles_table(state, slot));
}
