//! Token-position extraction rules for measurement tool output.
//!
//! The measurement tools are not machine-readable: each result is pulled
//! out of human-oriented text at a fixed token position. These rules are
//! the most brittle part of the probe contract, so they live here in one
//! place and are tested against literal captured tool outputs. Any
//! deviation from the expected shape is a `ParseFailure`, never a panic.

use crate::ProbeError;

/// Whitespace-separated field `index` of the last non-empty line.
///
/// Used for per-line tool reports where the result row is printed last:
/// the iperf UDP server report (field 8 = jitter) and the ib_send_lat
/// summary row (field 5 = t_avg).
pub(crate) fn last_line_field(output: &str, index: usize, tool: &str) -> Result<f64, ProbeError> {
    let line = output
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| parse_failure(tool, "empty output"))?;
    let token = line.split_whitespace().nth(index).ok_or_else(|| {
        parse_failure(
            tool,
            &format!("last line has no field {index}: {:?}", line.trim()),
        )
    })?;
    parse_float(token, tool)
}

/// Whitespace-separated field `index` of the text following the first
/// occurrence of `marker`.
///
/// Used for aggregated multi-stream iperf runs, where the result of
/// interest is on the `[SUM]` row (field 5 after the marker = bandwidth).
pub(crate) fn field_after_marker(
    output: &str,
    marker: &str,
    index: usize,
    tool: &str,
) -> Result<f64, ProbeError> {
    let (_, rest) = output
        .split_once(marker)
        .ok_or_else(|| parse_failure(tool, &format!("no {marker:?} marker in output")))?;
    let token = rest.split_whitespace().nth(index).ok_or_else(|| {
        parse_failure(tool, &format!("no field {index} after {marker:?} marker"))
    })?;
    parse_float(token, tool)
}

/// The entire trimmed output is the number.
///
/// Used for tools asked to print a single aggregate value, e.g.
/// `ib_send_bw --output bandwidth`.
pub(crate) fn sole_number(output: &str, tool: &str) -> Result<f64, ProbeError> {
    parse_float(output.trim(), tool)
}

fn parse_float(token: &str, tool: &str) -> Result<f64, ProbeError> {
    token
        .parse::<f64>()
        .map_err(|_| parse_failure(tool, &format!("expected a number, got {token:?}")))
}

fn parse_failure(tool: &str, reason: &str) -> ProbeError {
    ProbeError::ParseFailure {
        tool: tool.into(),
        reason: reason.into(),
    }
}
