//! Record representation and drop-count annotation

/// An opaque, already-serialized log record.
pub type Record = Vec<u8>;

/// Every this-many failed admissions, one record is forced through annotated
/// with the cumulative failure count.
pub const DROP_SAMPLE_INTERVAL: u64 = 100;

/// Field name carrying the cumulative failure count in forced-through records
pub const DROP_COUNT_FIELD: &str = "blockNums";

/// Append `"blockNums":<count>` as the last field of a JSON-object record.
///
/// The record must end with `}` optionally followed by `\n`; that closing
/// delimiter is stripped, the field is appended and the delimiter restored.
/// Records without a recognizable delimiter are returned unchanged.
///
/// # Example
///
/// ```
/// use sharded_log_sink::core::record::annotate_drop_count;
///
/// let tagged = annotate_drop_count(b"{\"msg\":\"hi\"}\n".to_vec(), 200);
/// assert_eq!(tagged, b"{\"msg\":\"hi\",\"blockNums\":200}\n");
/// ```
pub fn annotate_drop_count(mut record: Record, count: u64) -> Record {
    let newline = record.ends_with(b"}\n");
    if !newline && !record.ends_with(b"}") {
        return record;
    }
    record.truncate(record.len() - if newline { 2 } else { 1 });

    // `{` alone means the object had no fields yet
    let empty_object = record
        .iter()
        .rev()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'{');
    if !empty_object {
        record.push(b',');
    }
    record.extend_from_slice(format!("\"{}\":{}}}", DROP_COUNT_FIELD, count).as_bytes());
    if newline {
        record.push(b'\n');
    }
    record
}
