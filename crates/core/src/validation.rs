//! Declarative validation for pet payloads.
//!
//! Creation and update share one generic [`validate`] function driven by the
//! two rule tables below. Each field is checked independently so a rejected
//! payload reports every offending field at once.

use std::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

use crate::types::{NewPet, PetChanges, Sex};

/// Whether a field must be supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Must be present and non-null.
    Required,
    /// May be absent or `null`.
    Nullable,
    /// Validated only when the key is present; a present `null` is rejected.
    Sometimes,
}

/// Shape and bounds applied to a present value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    /// String whose trimmed length (in characters) lies in `min..=max`.
    Text { min: usize, max: usize },
    /// Integer (JSON number or numeric string) bounded below and optionally above.
    Integer { min: i64, max: Option<i64> },
    /// Exact match against one of the listed values.
    OneOf(&'static [&'static str]),
}

/// Messages reported for each kind of failure on a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMessages {
    pub required: &'static str,
    pub invalid: &'static str,
    pub too_small: &'static str,
    pub too_large: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
    pub field: &'static str,
    pub presence: Presence,
    pub constraint: Constraint,
    pub messages: FieldMessages,
}

const NAME_LENGTH: Constraint = Constraint::Text { min: 2, max: 255 };
const TYPE_LENGTH: Constraint = Constraint::Text { min: 2, max: 255 };
const YEARS_RANGE: Constraint = Constraint::Integer { min: 0, max: None };
const MONTHS_RANGE: Constraint = Constraint::Integer {
    min: 0,
    max: Some(11),
};
const SEX_CHOICES: Constraint = Constraint::OneOf(Sex::VALUES);

const NAME_MESSAGES: FieldMessages = FieldMessages {
    required: "Nome é obrigatório",
    invalid: "Nome deve ser um texto",
    too_small: "Nome deve ter pelo menos 2 caracteres",
    too_large: "Nome deve ter no máximo 255 caracteres",
};

const TYPE_MESSAGES: FieldMessages = FieldMessages {
    required: "Tipo é obrigatório",
    invalid: "Tipo deve ser um texto",
    too_small: "Tipo deve ter pelo menos 2 caracteres",
    too_large: "Tipo deve ter no máximo 255 caracteres",
};

const YEARS_MESSAGES: FieldMessages = FieldMessages {
    required: "Idade em anos é obrigatória",
    invalid: "Idade em anos deve ser um número inteiro",
    too_small: "Idade em anos deve ser maior ou igual a 0",
    too_large: "Idade em anos deve ser um número inteiro",
};

const MONTHS_MESSAGES: FieldMessages = FieldMessages {
    required: "Idade em meses é obrigatória",
    invalid: "Idade em meses deve ser um número inteiro",
    too_small: "Idade em meses deve ser maior ou igual a 0",
    too_large: "Idade em meses deve ser no máximo 11",
};

const SEX_MESSAGES: FieldMessages = FieldMessages {
    required: "Sexo é obrigatório",
    invalid: "Sexo deve ser macho ou fêmea",
    too_small: "Sexo deve ser macho ou fêmea",
    too_large: "Sexo deve ser macho ou fêmea",
};

/// Rules applied when a pet is created.
pub const CREATE_RULES: &[FieldRule] = &[
    FieldRule {
        field: "nome",
        presence: Presence::Required,
        constraint: NAME_LENGTH,
        messages: NAME_MESSAGES,
    },
    FieldRule {
        field: "tipo",
        presence: Presence::Required,
        constraint: TYPE_LENGTH,
        messages: TYPE_MESSAGES,
    },
    FieldRule {
        field: "idade_anos",
        presence: Presence::Required,
        constraint: YEARS_RANGE,
        messages: YEARS_MESSAGES,
    },
    FieldRule {
        field: "idade_meses",
        presence: Presence::Nullable,
        constraint: MONTHS_RANGE,
        messages: MONTHS_MESSAGES,
    },
    FieldRule {
        field: "sexo",
        presence: Presence::Required,
        constraint: SEX_CHOICES,
        messages: SEX_MESSAGES,
    },
];

/// Rules applied to partial updates: same constraints, every field optional.
pub const UPDATE_RULES: &[FieldRule] = &[
    FieldRule {
        field: "nome",
        presence: Presence::Sometimes,
        constraint: NAME_LENGTH,
        messages: NAME_MESSAGES,
    },
    FieldRule {
        field: "tipo",
        presence: Presence::Sometimes,
        constraint: TYPE_LENGTH,
        messages: TYPE_MESSAGES,
    },
    FieldRule {
        field: "idade_anos",
        presence: Presence::Sometimes,
        constraint: YEARS_RANGE,
        messages: YEARS_MESSAGES,
    },
    FieldRule {
        field: "idade_meses",
        presence: Presence::Sometimes,
        constraint: MONTHS_RANGE,
        messages: MONTHS_MESSAGES,
    },
    FieldRule {
        field: "sexo",
        presence: Presence::Sometimes,
        constraint: SEX_CHOICES,
        messages: SEX_MESSAGES,
    },
];

/// Normalized value for a field that passed its rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Choice(&'static str),
}

/// Fields that passed validation, in rule order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedFields(Vec<(&'static str, FieldValue)>);

impl ValidatedFields {
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, value)| value)
    }

    fn text(&self, field: &str) -> Option<String> {
        match self.get(field) {
            Some(FieldValue::Text(value)) => Some(value.clone()),
            _ => None,
        }
    }

    fn integer(&self, field: &str) -> Option<i64> {
        match self.get(field) {
            Some(FieldValue::Integer(value)) => Some(*value),
            _ => None,
        }
    }

    fn sex(&self, field: &str) -> Option<Sex> {
        match self.get(field) {
            Some(FieldValue::Choice(value)) => value.parse().ok(),
            _ => None,
        }
    }
}

/// Field-level rejection messages, kept in rule order.
///
/// Serializes as `{ "<field>": ["<message>", ...] }`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(Vec<(&'static str, Vec<&'static str>)>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &'static str, message: &'static str) {
        match self.0.iter_mut().find(|(name, _)| *name == field) {
            Some((_, messages)) => messages.push(message),
            None => self.0.push((field, vec![message])),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&[&'static str]> {
        self.0
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, messages)| messages.as_slice())
    }

    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.iter().map(|(name, _)| *name)
    }

    /// First message of the first failing field.
    pub fn first_message(&self) -> Option<&'static str> {
        self.0
            .first()
            .and_then(|(_, messages)| messages.first().copied())
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.fields().collect();
        write!(f, "invalid fields: {}", fields.join(", "))
    }
}

impl std::error::Error for FieldErrors {}

impl Serialize for FieldErrors {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (field, messages) in &self.0 {
            map.serialize_entry(field, messages)?;
        }
        map.end()
    }
}

/// Applies `rules` to `input`, collecting every failing field.
pub fn validate(
    rules: &[FieldRule],
    input: &Map<String, Value>,
) -> Result<ValidatedFields, FieldErrors> {
    let mut accepted = Vec::new();
    let mut errors = FieldErrors::new();

    for rule in rules {
        match check_field(rule, input.get(rule.field)) {
            Ok(Some(value)) => accepted.push((rule.field, value)),
            Ok(None) => {}
            Err(message) => errors.add(rule.field, message),
        }
    }

    if errors.is_empty() {
        Ok(ValidatedFields(accepted))
    } else {
        Err(errors)
    }
}

/// Validates a creation payload into a [`NewPet`].
pub fn validate_new_pet(input: &Map<String, Value>) -> Result<NewPet, FieldErrors> {
    let fields = validate(CREATE_RULES, input)?;

    // Every creation field is required, so `validate` has already rejected a gap.
    let (Some(nome), Some(tipo), Some(idade_anos), Some(sexo)) = (
        fields.text("nome"),
        fields.text("tipo"),
        fields.integer("idade_anos"),
        fields.sex("sexo"),
    ) else {
        return Err(FieldErrors::new());
    };
    Ok(NewPet {
        nome,
        tipo,
        idade_anos,
        idade_meses: fields.integer("idade_meses"),
        sexo,
    })
}

/// Validates a partial update payload into [`PetChanges`].
pub fn validate_pet_changes(input: &Map<String, Value>) -> Result<PetChanges, FieldErrors> {
    let fields = validate(UPDATE_RULES, input)?;
    Ok(PetChanges {
        nome: fields.text("nome"),
        tipo: fields.text("tipo"),
        idade_anos: fields.integer("idade_anos"),
        idade_meses: fields.integer("idade_meses"),
        sexo: fields.sex("sexo"),
    })
}

fn check_field(rule: &FieldRule, raw: Option<&Value>) -> Result<Option<FieldValue>, &'static str> {
    let value = match raw {
        None => {
            return match rule.presence {
                Presence::Required => Err(rule.messages.required),
                Presence::Nullable | Presence::Sometimes => Ok(None),
            }
        }
        Some(value) => value,
    };

    // Blank strings only count as text for text fields; elsewhere they read as null.
    let blank = matches!(value, Value::String(s) if s.trim().is_empty());
    if value.is_null() || (blank && !matches!(rule.constraint, Constraint::Text { .. })) {
        return match rule.presence {
            Presence::Required => Err(rule.messages.required),
            Presence::Nullable => Ok(None),
            Presence::Sometimes => Err(rule.messages.invalid),
        };
    }

    check_constraint(rule, value).map(Some)
}

fn check_constraint(rule: &FieldRule, value: &Value) -> Result<FieldValue, &'static str> {
    let messages = &rule.messages;
    match rule.constraint {
        Constraint::Text { min, max } => {
            let Value::String(raw) = value else {
                return Err(messages.invalid);
            };
            let trimmed = raw.trim();
            let length = trimmed.chars().count();
            if length == 0 {
                Err(messages.required)
            } else if length < min {
                Err(messages.too_small)
            } else if length > max {
                Err(messages.too_large)
            } else {
                Ok(FieldValue::Text(trimmed.to_string()))
            }
        }
        Constraint::Integer { min, max } => {
            let number = parse_integer(value).ok_or(messages.invalid)?;
            if number < min {
                return Err(messages.too_small);
            }
            if let Some(max) = max {
                if number > max {
                    return Err(messages.too_large);
                }
            }
            Ok(FieldValue::Integer(number))
        }
        Constraint::OneOf(choices) => {
            let Value::String(raw) = value else {
                return Err(messages.invalid);
            };
            let trimmed = raw.trim();
            choices
                .iter()
                .find(|choice| **choice == trimmed)
                .map(|choice| FieldValue::Choice(*choice))
                .ok_or(messages.invalid)
        }
    }
}

fn parse_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.fract() == 0.0 && float.abs() < i64::MAX as f64)
                .map(|float| float as i64)
        }),
        Value::String(raw) => raw.trim().parse::<i64>().ok(),
        _ => None,
    }
}
