//! Positional parameter binding.
//!
//! Tokens are bound to parameters in declared order. Text parameters are the
//! only ones that may span several tokens:
//!
//! - a quoted token always fills a text parameter on its own
//! - the last parameter, if text, takes everything that remains
//! - otherwise text runs until a token shaped like the next parameter that
//!   must be filled (an `@mention`, a date, an option)
//!
//! An optional typed parameter is skipped when the token in its slot clearly
//! belongs to a later parameter, so `/create-task x @a high` still binds
//! `priority` without a due date.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use huddle_proto::ChannelId;

use crate::{
    catalog::{CommandDefinition, CommandParameter, ParameterKind},
    directory::{MemberDirectory, MemberRef},
    error::ParameterValidationError,
    tokenizer::{Token, tokenize},
};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A typed parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// Free text
    Text(String),
    /// Resolved member
    Member(MemberRef),
    /// Calendar date
    Date(NaiveDate),
    /// Catalog option
    Choice(&'static str),
}

impl ParamValue {
    /// Canonical text sent on the wire.
    pub fn to_wire(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Member(member) => member.id.to_string(),
            Self::Date(date) => date.format(DATE_FORMAT).to_string(),
            Self::Choice(choice) => (*choice).to_owned(),
        }
    }
}

/// A parameter slot filled from user input, valid or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundValue {
    /// Token text (mention marker stripped)
    pub raw: String,
    /// Parsed value, or why it is invalid
    pub value: Result<ParamValue, ParameterValidationError>,
}

impl BoundValue {
    fn valid(raw: impl Into<String>, value: ParamValue) -> Self {
        Self { raw: raw.into(), value: Ok(value) }
    }

    fn invalid(raw: impl Into<String>, err: ParameterValidationError) -> Self {
        Self { raw: raw.into(), value: Err(err) }
    }
}

/// A command bound to (possibly partial) parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    definition: &'static CommandDefinition,
    channel_id: ChannelId,
    values: BTreeMap<&'static str, BoundValue>,
    extra: Vec<String>,
}

impl CommandInvocation {
    /// Bind `args` (the text after the command name) to `definition`.
    pub fn bind(
        definition: &'static CommandDefinition,
        args: &str,
        channel_id: &ChannelId,
        directory: &dyn MemberDirectory,
        mention: char,
    ) -> Self {
        let tokens = tokenize(args);
        let params = definition.parameters;
        let mut values = BTreeMap::new();
        let mut idx = 0;

        for (pi, param) in params.iter().enumerate() {
            let Some(token) = tokens.get(idx) else {
                break;
            };
            let later = &params[pi + 1..];

            if param.kind == ParameterKind::Text {
                let (raw, consumed) = take_text(&tokens[idx..], later, mention);
                idx += consumed;
                values.insert(param.name, BoundValue::valid(raw.clone(), ParamValue::Text(raw)));
                continue;
            }

            if !param.required
                && !fits(param.kind, token, mention)
                && later.iter().any(|p| p.kind != ParameterKind::Text && fits(p.kind, token, mention))
            {
                continue;
            }

            idx += 1;
            values.insert(param.name, bind_typed(param, token, channel_id, directory, mention));
        }

        let extra = tokens[idx.min(tokens.len())..].iter().map(|t| t.text.clone()).collect();
        Self { definition, channel_id: channel_id.clone(), values, extra }
    }

    /// Catalog entry
    pub fn definition(&self) -> &'static CommandDefinition {
        self.definition
    }

    /// Command name without marker
    pub fn name(&self) -> &'static str {
        self.definition.name
    }

    /// Channel the command targets
    pub fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    /// Valid value for `param`.
    pub fn value(&self, param: &str) -> Option<&ParamValue> {
        self.values.get(param).and_then(|bound| bound.value.as_ref().ok())
    }

    /// Text value for `param`, if bound to text.
    pub fn text(&self, param: &str) -> Option<&str> {
        match self.value(param)? {
            ParamValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Token text for `param`, valid or not.
    pub fn raw(&self, param: &str) -> Option<&str> {
        self.values.get(param).map(|bound| bound.raw.as_str())
    }

    /// Slot for `param`, valid or not.
    pub fn bound(&self, param: &str) -> Option<&BoundValue> {
        self.values.get(param)
    }

    /// Whether `param` holds a valid value.
    pub fn is_bound(&self, param: &str) -> bool {
        self.value(param).is_some()
    }

    /// Required parameters without a valid value, in declared order.
    pub fn missing_required(&self) -> Vec<&'static str> {
        self.definition
            .parameters
            .iter()
            .filter(|p| p.required && !self.is_bound(p.name))
            .map(|p| p.name)
            .collect()
    }

    /// Every invalid value and leftover token, in declared order.
    pub fn errors(&self) -> Vec<ParameterValidationError> {
        let invalid = self
            .definition
            .parameters
            .iter()
            .filter_map(|p| self.values.get(p.name))
            .filter_map(|bound| bound.value.clone().err());
        let extra = self
            .extra
            .iter()
            .map(|raw| ParameterValidationError::UnexpectedArgument { raw: raw.clone() });
        invalid.chain(extra).collect()
    }

    /// All required parameters bound and nothing invalid.
    pub fn is_ready(&self) -> bool {
        self.validate().is_ok()
    }

    /// First reason this invocation cannot execute.
    pub fn validate(&self) -> Result<(), ParameterValidationError> {
        if let Some(err) = self.errors().into_iter().next() {
            return Err(err);
        }
        match self.missing_required().first().copied() {
            Some(param) => Err(ParameterValidationError::MissingRequired { param }),
            None => Ok(()),
        }
    }

    /// Valid parameters rendered for the wire, keyed by name.
    pub fn wire_params(&self) -> BTreeMap<String, String> {
        self.values
            .iter()
            .filter_map(|(name, bound)| {
                bound.value.as_ref().ok().map(|value| ((*name).to_owned(), value.to_wire()))
            })
            .collect()
    }
}

/// Whether `token` has the shape `kind` accepts.
fn fits(kind: ParameterKind, token: &Token, mention: char) -> bool {
    match kind {
        ParameterKind::Text => true,
        _ if token.quoted => false,
        ParameterKind::UserRef => token.text.starts_with(mention),
        ParameterKind::Date => parse_date(&token.text).is_some(),
        ParameterKind::Enum(options) => options.contains(&token.text.as_str()),
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, DATE_FORMAT).ok()
}

/// Join tokens for a text parameter. Returns the text and tokens consumed.
fn take_text(tokens: &[Token], later: &[CommandParameter], mention: char) -> (String, usize) {
    let Some(first) = tokens.first() else {
        return (String::new(), 0);
    };
    if first.quoted {
        return (first.text.clone(), 1);
    }
    if later.is_empty() {
        return (join(tokens), tokens.len());
    }

    // Parameters up to and including the next required one can claim a token.
    let mut stops = Vec::new();
    for param in later {
        if param.kind != ParameterKind::Text {
            stops.push(param.kind);
        }
        if param.required {
            break;
        }
    }
    if stops.is_empty() {
        return (first.text.clone(), 1);
    }

    let end = tokens
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, token)| token.quoted || stops.iter().any(|kind| fits(*kind, token, mention)))
        .map_or(tokens.len(), |(i, _)| i);

    (join(&tokens[..end]), end)
}

fn join(tokens: &[Token]) -> String {
    tokens.iter().map(|t| t.text.as_str()).collect::<Vec<_>>().join(" ")
}

fn bind_typed(
    param: &'static CommandParameter,
    token: &Token,
    channel_id: &ChannelId,
    directory: &dyn MemberDirectory,
    mention: char,
) -> BoundValue {
    let raw = token.text.as_str();
    match param.kind {
        ParameterKind::Text => BoundValue::valid(raw, ParamValue::Text(raw.to_owned())),
        ParameterKind::UserRef => match raw.strip_prefix(mention).filter(|r| !r.is_empty()) {
            Some(reference) => match directory.resolve_member(channel_id, reference) {
                Some(member) => BoundValue::valid(reference, ParamValue::Member(member)),
                None => BoundValue::invalid(
                    reference,
                    ParameterValidationError::UnresolvedMember {
                        param: param.name,
                        reference: reference.to_owned(),
                    },
                ),
            },
            None => BoundValue::invalid(
                raw,
                ParameterValidationError::MissingMention { param: param.name, raw: raw.to_owned() },
            ),
        },
        ParameterKind::Date => match parse_date(raw) {
            Some(date) => BoundValue::valid(raw, ParamValue::Date(date)),
            None => BoundValue::invalid(
                raw,
                ParameterValidationError::InvalidDate { param: param.name, raw: raw.to_owned() },
            ),
        },
        ParameterKind::Enum(options) => match options.iter().find(|o| **o == raw) {
            Some(choice) => BoundValue::valid(raw, ParamValue::Choice(*choice)),
            None => BoundValue::invalid(
                raw,
                ParameterValidationError::InvalidOption {
                    param: param.name,
                    raw: raw.to_owned(),
                    options: options.join(", "),
                },
            ),
        },
    }
}
