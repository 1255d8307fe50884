//! Response tagging for correlated calls.
//!
//! A correlated expression is sent as
//! `print("ID<id>:{}".format(<expr>))`, so the hub answers with a line
//! `ID<id>:<value>`. Everything after the colon is the payload, verbatim.

use std::sync::LazyLock;

use regex::Regex;

#[allow(clippy::expect_used)]
static RESULT_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ID(\d+):").expect("result tag pattern is valid"));

/// Wrap `expr` so the hub prints its value prefixed with `ID<id>:`.
#[must_use]
pub fn tagged_statement(id: u32, expr: &str) -> String {
    format!("print(\"ID{id}:{{}}\".format({expr}))")
}

/// Split a tagged result line into its id and payload.
///
/// Returns `None` for ordinary program output, including tags whose
/// digits do not fit a `u32`.
#[must_use]
pub fn parse_tagged_line(line: &str) -> Option<(u32, &str)> {
    let caps = RESULT_TAG.captures(line)?;
    let whole = caps.get(0)?;
    let id = caps.get(1)?.as_str().parse().ok()?;
    Some((id, &line[whole.end()..]))
}
