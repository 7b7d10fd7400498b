//! Category read model
//!
//! Categories group products for browsing. The storefront only reads them;
//! they are maintained by catalog tooling.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use super::product::slugify;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: String,
}

impl Category {
    pub fn create(name: impl Into<String>, description: impl Into<String>) -> Self {
        let name = name.into();
        Self { id: Uuid::now_v7(), slug: slugify(&name), name, description: description.into() }
    }
}
