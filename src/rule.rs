//! SCHC Rule structures and parsing

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, SchcError};
use crate::field_id::{FIELD_COUNT, FieldId};

/// Default static context, shared by both ends of the link.
const BUILTIN_RULES: &str = include_str!("../rules/lorawan.json");

/// Tag 0 is reserved for uncompressed packets, so at most 255 rules fit.
pub const MAX_RULES: usize = u8::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchingOperator {
    Equal,
    Ignore,
    /// Compare only the given number of most significant bits
    Msb(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionAction {
    NotSent,
    ValueSent,
    /// Send the bits below the MSB operand
    Lsb,
    ComputeLength,
    ComputeChecksum,
    /// Rebuild from the device EUI
    DeviceIid,
}

/// Field descriptor within a rule
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Field {
    #[serde(rename = "FID")]
    pub fid: FieldId,

    #[serde(rename = "FL", default, skip_serializing_if = "Option::is_none")]
    pub fl: Option<u8>,

    #[serde(rename = "TV", default, deserialize_with = "deserialize_tv")]
    pub tv: u32,

    #[serde(rename = "MO")]
    #[serde(deserialize_with = "deserialize_mo")]
    #[serde(serialize_with = "serialize_mo")]
    pub mo: MatchingOperator,

    #[serde(rename = "CDA")]
    #[serde(deserialize_with = "deserialize_cda")]
    #[serde(serialize_with = "serialize_cda")]
    pub cda: CompressionAction,

    #[serde(rename = "MO.val", default, skip_serializing_if = "Option::is_none")]
    pub mo_val: Option<u8>,
}

impl Field {
    pub fn new(fid: FieldId, tv: u32, mo: MatchingOperator, cda: CompressionAction) -> Self {
        let mo_val = match mo {
            MatchingOperator::Msb(bits) => Some(bits),
            _ => None,
        };
        Self {
            fid,
            fl: None,
            tv,
            mo,
            cda,
            mo_val,
        }
    }

    /// `equal` / `not-sent`: the common case for static fields.
    pub fn equal(fid: FieldId, tv: u32) -> Self {
        Self::new(fid, tv, MatchingOperator::Equal, CompressionAction::NotSent)
    }

    pub fn ignore(fid: FieldId, cda: CompressionAction) -> Self {
        Self::new(fid, 0, MatchingOperator::Ignore, cda)
    }

    /// `MSB(bits)` / `LSB`.
    pub fn msb(fid: FieldId, tv: u32, bits: u8) -> Self {
        Self::new(fid, tv, MatchingOperator::Msb(bits), CompressionAction::Lsb)
    }

    pub fn with_length(mut self, fl: u8) -> Self {
        self.fl = Some(fl);
        self
    }

    /// Field length in bits: explicit FL, else the header width.
    pub fn length(&self) -> u8 {
        self.fl.unwrap_or_else(|| self.fid.default_size_bits())
    }

    /// Number of most significant bits held by the rule.
    pub fn msb_length(&self) -> u8 {
        match self.mo {
            MatchingOperator::Msb(bits) => bits,
            _ => 0,
        }
    }

    /// Bytes this field contributes to the residue.
    pub fn residue_bytes(&self) -> usize {
        match self.cda {
            CompressionAction::ValueSent => (self.length() as usize).div_ceil(8),
            CompressionAction::Lsb => ((self.length() - self.msb_length()) as usize).div_ceil(8),
            _ => 0,
        }
    }

    /// Apply MO.val to the MSB operator and check the descriptor against
    /// its position.
    fn resolve(&mut self) -> Result<()> {
        if let MatchingOperator::Msb(bits) = self.mo {
            let bits = self.mo_val.unwrap_or(bits);
            self.mo = MatchingOperator::Msb(bits);
            self.mo_val = Some(bits);
        }

        let length = self.length();
        if length > 32 {
            return Err(SchcError::RuleValidation(format!(
                "Field {}: FL ({}) exceeds 32 bits",
                self.fid, length
            )));
        }

        if let MatchingOperator::Msb(bits) = self.mo
            && bits > length
        {
            return Err(SchcError::RuleValidation(format!(
                "Field {}: MO.val ({}) exceeds field length ({} bits)",
                self.fid, bits, length
            )));
        }

        if self.mo != MatchingOperator::Ignore && (self.tv as u64) >> length != 0 {
            return Err(SchcError::RuleValidation(format!(
                "Field {}: TV {:#x} does not fit in {} bits",
                self.fid, self.tv, length
            )));
        }

        if self.cda == CompressionAction::ValueSent && length < self.fid.default_size_bits() {
            return Err(SchcError::RuleValidation(format!(
                "Field {}: value-sent with FL ({}) narrower than the {}-bit header field",
                self.fid,
                length,
                self.fid.default_size_bits()
            )));
        }

        let cda_ok = match self.cda {
            CompressionAction::NotSent | CompressionAction::ValueSent => true,
            CompressionAction::Lsb => matches!(self.mo, MatchingOperator::Msb(_)),
            CompressionAction::ComputeLength => self.fid.is_length(),
            CompressionAction::ComputeChecksum => self.fid == FieldId::UdpCksum,
            CompressionAction::DeviceIid => self.fid.iid_part().is_some(),
        };
        if !cda_ok {
            return Err(SchcError::RuleValidation(format!(
                "Field {}: CDA {} not applicable here",
                self.fid,
                cda_str(self.cda)
            )));
        }

        Ok(())
    }
}

fn mo_str(mo: MatchingOperator) -> &'static str {
    match mo {
        MatchingOperator::Equal => "equal",
        MatchingOperator::Ignore => "ignore",
        MatchingOperator::Msb(_) => "MSB",
    }
}

fn cda_str(cda: CompressionAction) -> &'static str {
    match cda {
        CompressionAction::NotSent => "not-sent",
        CompressionAction::ValueSent => "value-sent",
        CompressionAction::Lsb => "LSB",
        CompressionAction::ComputeLength => "compute-length",
        CompressionAction::ComputeChecksum => "compute-checksum",
        CompressionAction::DeviceIid => "devIID",
    }
}

fn deserialize_mo<'de, D>(deserializer: D) -> std::result::Result<MatchingOperator, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    match s.as_str() {
        "equal" => Ok(MatchingOperator::Equal),
        "ignore" => Ok(MatchingOperator::Ignore),
        "MSB" => Ok(MatchingOperator::Msb(0)),
        other => Err(serde::de::Error::custom(format!(
            "unknown matching operator: {other}"
        ))),
    }
}

fn serialize_mo<S>(mo: &MatchingOperator, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(mo_str(*mo))
}

fn deserialize_cda<'de, D>(deserializer: D) -> std::result::Result<CompressionAction, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    match s.as_str() {
        "not-sent" => Ok(CompressionAction::NotSent),
        "value-sent" => Ok(CompressionAction::ValueSent),
        "LSB" => Ok(CompressionAction::Lsb),
        "compute-length" => Ok(CompressionAction::ComputeLength),
        "compute-checksum" => Ok(CompressionAction::ComputeChecksum),
        "devIID" => Ok(CompressionAction::DeviceIid),
        other => Err(serde::de::Error::custom(format!("unknown CDA: {other}"))),
    }
}

fn serialize_cda<S>(cda: &CompressionAction, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(cda_str(*cda))
}

/// TV is either a JSON number or a decimal / `0x` hex string.
fn deserialize_tv<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let parsed = match &value {
        serde_json::Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        serde_json::Value::String(s) => match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex_digits) => u32::from_str_radix(hex_digits, 16).ok(),
            None => s.parse::<u32>().ok(),
        },
        _ => None,
    };
    parsed.ok_or_else(|| serde::de::Error::custom(format!("invalid TV: {value}")))
}

/// SCHC Compression Rule
///
/// Holds exactly one descriptor per header field, addressed by `FieldId`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(try_from = "RawRule", into = "RawRule")]
pub struct Rule {
    rule_id: u8,
    comment: Option<String>,
    fields: [Field; FIELD_COUNT],
}

/// On-disk form of a rule.
#[derive(Debug, Clone, Deserialize, Serialize)]
struct RawRule {
    #[serde(rename = "RuleID")]
    rule_id: u8,

    #[serde(rename = "Comment", default, skip_serializing_if = "Option::is_none")]
    comment: Option<String>,

    #[serde(rename = "Compression")]
    compression: Vec<Field>,
}

impl TryFrom<RawRule> for Rule {
    type Error = SchcError;

    fn try_from(raw: RawRule) -> Result<Self> {
        Rule::new(raw.rule_id, raw.comment, raw.compression)
    }
}

impl From<Rule> for RawRule {
    fn from(rule: Rule) -> Self {
        RawRule {
            rule_id: rule.rule_id,
            comment: rule.comment,
            compression: rule.fields.into(),
        }
    }
}

impl Rule {
    /// Build a rule from descriptors given in any order. Every position must
    /// appear exactly once.
    pub fn new(rule_id: u8, comment: Option<String>, compression: Vec<Field>) -> Result<Self> {
        let mut slots: [Option<Field>; FIELD_COUNT] = Default::default();

        for mut field in compression {
            field.resolve()?;
            let slot = &mut slots[field.fid.index()];
            if slot.is_some() {
                return Err(SchcError::RuleValidation(format!(
                    "Rule {}: duplicate descriptor for {}",
                    rule_id, field.fid
                )));
            }
            *slot = Some(field);
        }

        let mut fields = Vec::with_capacity(FIELD_COUNT);
        for (fid, slot) in FieldId::ALL.into_iter().zip(slots) {
            match slot {
                Some(field) => fields.push(field),
                None => {
                    return Err(SchcError::RuleValidation(format!(
                        "Rule {}: missing descriptor for {}",
                        rule_id, fid
                    )));
                }
            }
        }

        let fields: [Field; FIELD_COUNT] = fields
            .try_into()
            .map_err(|_| SchcError::RuleValidation(format!("Rule {rule_id}: bad field count")))?;

        Ok(Rule {
            rule_id,
            comment,
            fields,
        })
    }

    /// Tag of this rule on the wire, equal to its position plus one.
    pub fn rule_id(&self) -> u8 {
        self.rule_id
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Descriptors in wire order.
    pub fn fields(&self) -> &[Field; FIELD_COUNT] {
        &self.fields
    }

    pub fn field(&self, fid: FieldId) -> &Field {
        &self.fields[fid.index()]
    }

    /// Total residue bytes a packet compressed with this rule carries.
    pub fn residue_len(&self) -> usize {
        self.fields.iter().map(Field::residue_bytes).sum()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Rule {}{}",
            self.rule_id,
            self.comment
                .as_deref()
                .map(|c| format!(" ({c})"))
                .unwrap_or_default()
        )?;
        for field in &self.fields {
            let mo = match field.mo {
                MatchingOperator::Msb(bits) => format!("MSB({bits})"),
                other => mo_str(other).to_string(),
            };
            writeln!(
                f,
                "  {:<18} {:>2}  {:#010x}  {:<8} {}",
                field.fid.as_str(),
                field.length(),
                field.tv,
                mo,
                cda_str(field.cda)
            )?;
        }
        Ok(())
    }
}

/// Ordered collection of rules. The tag of a rule on the wire is its
/// position plus one, and earlier rules win when several match.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Result<Self> {
        if rules.len() > MAX_RULES {
            return Err(SchcError::RuleValidation(format!(
                "{} rules exceed the {}-rule tag space",
                rules.len(),
                MAX_RULES
            )));
        }
        for (index, rule) in rules.iter().enumerate() {
            if rule.rule_id() as usize != index + 1 {
                return Err(SchcError::RuleValidation(format!(
                    "Rule at position {} has RuleID {}, expected {}",
                    index,
                    rule.rule_id(),
                    index + 1
                )));
            }
        }
        Ok(RuleSet { rules })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let rules: Vec<Rule> = serde_json::from_str(json)?;
        Self::new(rules)
    }

    /// The context compiled into the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_RULES)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.rules)?)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Look up the rule carried by a non-zero tag byte.
    pub fn by_tag(&self, tag: u8) -> Option<&Rule> {
        (tag as usize).checked_sub(1).and_then(|i| self.rules.get(i))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
