use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authenticated identity making a request.
///
/// Resolved by the HTTP layer from the bearer token and passed explicitly to
/// every registry operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Stored pet profile owned by a single principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PetRecord {
    pub id: i64,
    pub user_id: String,
    pub nome: String,
    pub tipo: String,
    pub idade_anos: i64,
    pub idade_meses: i64,
    pub sexo: Sex,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PetRecord {
    pub fn age(&self) -> PetAge {
        PetAge::new(self.idade_anos, self.idade_meses)
    }
}

/// Pet sex as exchanged on the wire (`macho` / `femea`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    #[serde(rename = "macho")]
    Male,
    #[serde(rename = "femea")]
    Female,
}

impl Sex {
    pub const VALUES: &'static [&'static str] = &["macho", "femea"];

    /// Returns the canonical database and wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "macho",
            Self::Female => "femea",
        }
    }
}

impl FromStr for Sex {
    type Err = UnknownSex;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "macho" => Ok(Self::Male),
            "femea" => Ok(Self::Female),
            other => Err(UnknownSex(other.to_string())),
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sex value: {0}")]
pub struct UnknownSex(pub String);

/// Age split into whole years and the remaining months.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PetAge {
    pub years: i64,
    pub months: i64,
}

impl PetAge {
    pub fn new(years: i64, months: i64) -> Self {
        Self { years, months }
    }
}

impl fmt::Display for PetAge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let years = match self.years {
            1 => "1 ano".to_string(),
            n => format!("{n} anos"),
        };
        let months = match self.months {
            1 => "1 mês".to_string(),
            n => format!("{n} meses"),
        };
        match (self.years, self.months) {
            (0, 0) => f.write_str("idade não informada"),
            (0, _) => f.write_str(&months),
            (_, 0) => f.write_str(&years),
            _ => write!(f, "{years} e {months}"),
        }
    }
}

/// Validated payload for a pet about to be created.
///
/// `idade_meses` stays optional here; the store applies the default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPet {
    pub nome: String,
    pub tipo: String,
    pub idade_anos: i64,
    pub idade_meses: Option<i64>,
    pub sexo: Sex,
}

impl NewPet {
    pub const DEFAULT_MONTHS: i64 = 0;

    pub fn months_or_default(&self) -> i64 {
        self.idade_meses.unwrap_or(Self::DEFAULT_MONTHS)
    }
}

/// Validated partial update. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PetChanges {
    pub nome: Option<String>,
    pub tipo: Option<String>,
    pub idade_anos: Option<i64>,
    pub idade_meses: Option<i64>,
    pub sexo: Option<Sex>,
}

impl PetChanges {
    /// Returns `true` when no field would be modified.
    pub fn is_empty(&self) -> bool {
        self.nome.is_none()
            && self.tipo.is_none()
            && self.idade_anos.is_none()
            && self.idade_meses.is_none()
            && self.sexo.is_none()
    }

    /// Names of the fields carried by this update, in wire vocabulary.
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.nome.is_some() {
            names.push("nome");
        }
        if self.tipo.is_some() {
            names.push("tipo");
        }
        if self.idade_anos.is_some() {
            names.push("idade_anos");
        }
        if self.idade_meses.is_some() {
            names.push("idade_meses");
        }
        if self.sexo.is_some() {
            names.push("sexo");
        }
        names
    }
}
