//! Address resolution for order and return delivery. The address book itself
//! is owned by an external collaborator; this service only answers "may this
//! user ship to this address".

use crate::{
    entities::{address, Address},
    errors::ServiceError,
};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

#[derive(Clone)]
pub struct AddressService {
    db: Arc<DatabaseConnection>,
}

impl AddressService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Resolves an address usable by `user_id`. With `store_pickup` the
    /// address must be a non-deleted store address; otherwise it must be a
    /// non-deleted address owned by the user.
    #[instrument(skip(self), fields(address_id = %address_id, user_id = %user_id))]
    pub async fn validate_address(
        &self,
        address_id: Uuid,
        user_id: Uuid,
        store_pickup: bool,
    ) -> Result<Option<address::Model>, ServiceError> {
        let mut query = Address::find()
            .filter(address::Column::Id.eq(address_id))
            .filter(address::Column::Deleted.eq(false));

        query = if store_pickup {
            query.filter(address::Column::IsStore.eq(true))
        } else {
            query
                .filter(address::Column::UserId.eq(user_id))
                .filter(address::Column::IsStore.eq(false))
        };

        Ok(query.one(&*self.db).await?)
    }
}
