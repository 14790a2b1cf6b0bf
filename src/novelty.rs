use std::collections::HashSet;

use crate::invoice::InvoiceRecord;

/// 既知ID集合に含まれないレコードだけを入力順のまま返す
pub fn filter_new(
    records: Vec<InvoiceRecord>,
    previously_seen: &HashSet<String>,
) -> Vec<InvoiceRecord> {
    records
        .into_iter()
        .filter(|record| !previously_seen.contains(record.id()))
        .collect()
}
