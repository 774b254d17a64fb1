pub mod types;
pub mod validation;

pub use types::{NewPet, PetAge, PetChanges, PetRecord, Principal, Sex};
pub use validation::{
    validate, validate_new_pet, validate_pet_changes, FieldErrors, CREATE_RULES, UPDATE_RULES,
};
