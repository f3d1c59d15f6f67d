//! Field Matching Logic
//!
//! Selects the rule for a header by checking every field of each rule
//! against the header value with the field's matching operator. Fields the
//! decompressor rebuilds from the device EUI only match the device's own
//! interface identifier.

use crate::device::DeviceIdentity;
use crate::error::{Result, SchcError};
use crate::header::{HeaderContext, width_mask};
use crate::rule::{CompressionAction, Field, MatchingOperator, Rule, RuleSet};

// =============================================================================
// Value Matching Functions
// =============================================================================

/// Exact match of the header value against the target value truncated to
/// the field length.
#[inline]
pub fn values_match(value: u32, field: &Field) -> bool {
    value == field.tv & width_mask(field.length())
}

/// Check if the `bits` most significant bits of a `field_bits` wide value
/// match the target value.
#[inline]
pub fn msb_match(value: u32, tv: u32, bits: u8, field_bits: u8) -> bool {
    if bits > field_bits {
        return false;
    }
    let shift = field_bits - bits;
    ((value as u64) >> shift) == ((tv as u64) >> shift)
}

/// Apply a field's matching operator to a header value.
#[inline]
pub fn field_matches(field: &Field, value: u32, device: &DeviceIdentity) -> bool {
    if field.cda == CompressionAction::DeviceIid
        && let Some(part) = field.fid.iid_part()
        && value != device.iid_part(part)
    {
        return false;
    }
    match field.mo {
        MatchingOperator::Ignore => true,
        MatchingOperator::Equal => values_match(value, field),
        MatchingOperator::Msb(bits) => msb_match(value, field.tv, bits, field.length()),
    }
}

// =============================================================================
// Rule Selection
// =============================================================================

/// True if every field of the rule accepts the header.
pub fn rule_matches(rule: &Rule, header: &HeaderContext, device: &DeviceIdentity) -> bool {
    rule.fields()
        .iter()
        .all(|field| field_matches(field, header.get(field.fid), device))
}

/// First rule, in rule set order, that accepts the header.
pub fn match_rule<'a>(
    header: &HeaderContext,
    rules: &'a RuleSet,
    device: &DeviceIdentity,
) -> Option<&'a Rule> {
    rules
        .rules()
        .iter()
        .find(|rule| rule_matches(rule, header, device))
}

/// Like [`match_rule`], for callers that treat passthrough as a failure.
pub fn require_rule<'a>(
    header: &HeaderContext,
    rules: &'a RuleSet,
    device: &DeviceIdentity,
) -> Result<&'a Rule> {
    match_rule(header, rules, device).ok_or(SchcError::NoRuleMatched)
}
