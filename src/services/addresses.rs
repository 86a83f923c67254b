//! Address book operations.

use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{Address, AddressUpdate, NewAddress};
use crate::store::Store;
use crate::{EcommerceError, Result};

fn address_not_found(id: Uuid) -> EcommerceError {
    EcommerceError::NotFound(format!("Address {id}"))
}

#[derive(Clone)]
pub struct AddressService {
    store: Arc<dyn Store>,
}

impl AddressService {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<Address>> {
        Ok(self.store.address_book(user_id).await?.addresses().to_vec())
    }

    pub async fn get(&self, user_id: Uuid, address_id: Uuid) -> Result<Address> {
        self.store.address_book(user_id).await?.get(address_id).cloned().ok_or_else(|| address_not_found(address_id))
    }

    #[instrument(skip(self, input))]
    pub async fn add(&self, user_id: Uuid, input: NewAddress) -> Result<Address> {
        input.validate()?;
        let mut book = self.store.address_book(user_id).await?;
        let added = book.add(input).clone();
        self.store.save_address_book(&book).await?;
        Ok(added)
    }

    #[instrument(skip(self, update))]
    pub async fn update(&self, user_id: Uuid, address_id: Uuid, update: AddressUpdate) -> Result<Address> {
        update.validate()?;
        let mut book = self.store.address_book(user_id).await?;
        let updated = book.update(address_id, update).map_err(|_| address_not_found(address_id))?.clone();
        self.store.save_address_book(&book).await?;
        Ok(updated)
    }

    /// Idempotent. Orders keep their own copy of the address.
    #[instrument(skip(self))]
    pub async fn remove(&self, user_id: Uuid, address_id: Uuid) -> Result<()> {
        let mut book = self.store.address_book(user_id).await?;
        if book.remove(address_id) {
            self.store.save_address_book(&book).await?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn set_default(&self, user_id: Uuid, address_id: Uuid) -> Result<Vec<Address>> {
        let mut book = self.store.address_book(user_id).await?;
        book.set_default(address_id).map_err(|_| address_not_found(address_id))?;
        self.store.save_address_book(&book).await?;
        Ok(book.addresses().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use assert_matches::assert_matches;

    fn new_address(name: &str, is_default: bool) -> NewAddress {
        NewAddress {
            name: name.into(), phone: "9876543210".into(), address_line1: "12 MG Road".into(), address_line2: None,
            city: "Bengaluru".into(), state: "KA".into(), pincode: "560001".into(), is_default,
        }
    }

    #[tokio::test]
    async fn test_set_default_leaves_exactly_one() {
        let service = AddressService::new(Arc::new(MemoryStore::new()));
        let user = Uuid::now_v7();
        let home = service.add(user, new_address("Home", true)).await.unwrap();
        let work = service.add(user, new_address("Work", false)).await.unwrap();
        service.add(user, new_address("Parents", true)).await.unwrap();

        let all = service.set_default(user, work.id).await.unwrap();
        let defaults: Vec<_> = all.iter().filter(|a| a.is_default).collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].id, work.id);
        assert!(!service.get(user, home.id).await.unwrap().is_default);
    }

    #[tokio::test]
    async fn test_validation_and_ownership() {
        let service = AddressService::new(Arc::new(MemoryStore::new()));
        let user = Uuid::now_v7();
        let mut bad = new_address("Home", false);
        bad.phone = "12345".into();
        assert_matches!(service.add(user, bad).await, Err(EcommerceError::InvalidInput(_)));
        let mut bad = new_address("Home", false);
        bad.pincode = "56000".into();
        assert_matches!(service.add(user, bad).await, Err(EcommerceError::InvalidInput(_)));

        let home = service.add(user, new_address("Home", false)).await.unwrap();
        assert_matches!(service.get(Uuid::now_v7(), home.id).await, Err(EcommerceError::NotFound(_)));
        assert_matches!(service.set_default(Uuid::now_v7(), home.id).await, Err(EcommerceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_partial_update_and_remove() {
        let service = AddressService::new(Arc::new(MemoryStore::new()));
        let user = Uuid::now_v7();
        let home = service.add(user, new_address("Home", false)).await.unwrap();
        let update = AddressUpdate { city: Some("Mysuru".into()), ..Default::default() };
        let updated = service.update(user, home.id, update).await.unwrap();
        assert_eq!(updated.city, "Mysuru");
        assert_eq!(updated.name, "Home");

        service.remove(user, home.id).await.unwrap();
        service.remove(user, home.id).await.unwrap();
        assert!(service.list(user).await.unwrap().is_empty());
    }
}
