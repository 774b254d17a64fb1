use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use pet_registry_core::{
    validate_new_pet, validate_pet_changes, FieldErrors, PetRecord, Principal,
};
use pet_registry_storage::{Database, PetStoreError};

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Owner-scoped CRUD over pet records.
///
/// Every operation takes the calling principal explicitly; nothing outside the
/// principal's own records can be observed or changed through this type.
#[derive(Clone)]
pub struct PetRegistry {
    database: Database,
    clock: Clock,
}

impl PetRegistry {
    pub fn new(database: Database, clock: Clock) -> Self {
        Self { database, clock }
    }

    pub async fn list(&self, principal: &Principal) -> Result<Vec<PetRecord>, RegistryError> {
        let pets = self.database.pets().list_for_owner(&principal.id).await?;
        debug!(stage = "pets", op = "list", owner = %principal.id, count = pets.len(), "pets listed");
        Ok(pets)
    }

    pub async fn create(
        &self,
        principal: &Principal,
        input: &Map<String, Value>,
    ) -> Result<PetRecord, RegistryError> {
        let pet = validate_new_pet(input).map_err(|errors| validation_failed("create", errors))?;
        let record = self
            .database
            .pets()
            .insert(&principal.id, &pet, (self.clock)())
            .await?;

        info!(
            stage = "pets",
            op = "create",
            owner = %principal.id,
            pet_id = record.id,
            age = %record.age(),
            "pet created"
        );
        Ok(record)
    }

    pub async fn read(
        &self,
        principal: &Principal,
        pet_id: &str,
    ) -> Result<PetRecord, RegistryError> {
        let pet_id = parse_pet_id(pet_id)?;
        Ok(self
            .database
            .pets()
            .find_for_owner(&principal.id, pet_id)
            .await?)
    }

    /// Applies a partial update. Validation runs before any lookup or write.
    pub async fn update(
        &self,
        principal: &Principal,
        pet_id: &str,
        input: &Map<String, Value>,
    ) -> Result<PetRecord, RegistryError> {
        let changes =
            validate_pet_changes(input).map_err(|errors| validation_failed("update", errors))?;
        let pet_id = parse_pet_id(pet_id)?;
        let pets = self.database.pets();

        if changes.is_empty() {
            return Ok(pets.find_for_owner(&principal.id, pet_id).await?);
        }

        let record = pets
            .update_for_owner(&principal.id, pet_id, &changes, (self.clock)())
            .await?;
        info!(
            stage = "pets",
            op = "update",
            owner = %principal.id,
            pet_id,
            fields = ?changes.field_names(),
            "pet updated"
        );
        Ok(record)
    }

    pub async fn delete(&self, principal: &Principal, pet_id: &str) -> Result<(), RegistryError> {
        let pet_id = parse_pet_id(pet_id)?;
        self.database
            .pets()
            .delete_for_owner(&principal.id, pet_id)
            .await?;
        info!(stage = "pets", op = "delete", owner = %principal.id, pet_id, "pet deleted");
        Ok(())
    }
}

// Identifiers that are not integers cannot name any stored pet.
fn parse_pet_id(raw: &str) -> Result<i64, RegistryError> {
    raw.trim().parse().map_err(|_| RegistryError::NotFound)
}

fn validation_failed(op: &'static str, errors: FieldErrors) -> RegistryError {
    counter!("pets_validation_failures_total", "op" => op).increment(1);
    debug!(stage = "pets", op, fields = %errors, "payload rejected");
    RegistryError::Validation(errors)
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("validation failed: {0}")]
    Validation(FieldErrors),
    #[error("pet not found")]
    NotFound,
    #[error("storage failure: {0}")]
    Storage(PetStoreError),
}

impl From<PetStoreError> for RegistryError {
    fn from(err: PetStoreError) -> Self {
        match err {
            PetStoreError::NotFound => Self::NotFound,
            other => Self::Storage(other),
        }
    }
}
