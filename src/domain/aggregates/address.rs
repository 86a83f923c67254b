//! Address Book Aggregate
//!
//! Addresses belong to the user profile. At most one is the default. Orders
//! never reference an entry; they copy it into a [`ShippingAddress`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[6-9]\d{9}$").unwrap());
static PINCODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{6}$").unwrap());

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub address_line1: String,
    pub address_line2: Option<String>,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub is_default: bool,
}

/// Frozen copy of an address stored on an order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub name: String,
    pub phone: String,
    pub address_line1: String,
    pub address_line2: Option<String>,
    pub city: String,
    pub state: String,
    pub pincode: String,
}

impl From<&Address> for ShippingAddress {
    fn from(a: &Address) -> Self {
        Self {
            name: a.name.clone(), phone: a.phone.clone(), address_line1: a.address_line1.clone(),
            address_line2: a.address_line2.clone(), city: a.city.clone(), state: a.state.clone(), pincode: a.pincode.clone(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewAddress {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[validate(regex(path = "PHONE_RE", message = "phone must be a 10 digit mobile number"))]
    pub phone: String,
    #[validate(length(min = 1, message = "address line 1 is required"))]
    pub address_line1: String,
    pub address_line2: Option<String>,
    #[validate(length(min = 1, message = "city is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "state is required"))]
    pub state: String,
    #[validate(regex(path = "PINCODE_RE", message = "pincode must be 6 digits"))]
    pub pincode: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct AddressUpdate {
    #[validate(length(min = 1))]
    pub name: Option<String>,
    #[validate(regex(path = "PHONE_RE"))]
    pub phone: Option<String>,
    #[validate(length(min = 1))]
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    #[validate(length(min = 1))]
    pub city: Option<String>,
    #[validate(length(min = 1))]
    pub state: Option<String>,
    #[validate(regex(path = "PINCODE_RE"))]
    pub pincode: Option<String>,
    pub is_default: Option<bool>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AddressBook {
    user_id: Uuid,
    addresses: Vec<Address>,
}

impl AddressBook {
    pub fn new(user_id: Uuid) -> Self { Self { user_id, addresses: vec![] } }
    pub fn restore(user_id: Uuid, addresses: Vec<Address>) -> Self { Self { user_id, addresses } }

    pub fn user_id(&self) -> Uuid { self.user_id }
    pub fn addresses(&self) -> &[Address] { &self.addresses }
    pub fn get(&self, id: Uuid) -> Option<&Address> { self.addresses.iter().find(|a| a.id == id) }

    /// Input must already be validated.
    pub fn add(&mut self, input: NewAddress) -> &Address {
        let id = Uuid::now_v7();
        if input.is_default { self.clear_default(); }
        self.addresses.push(Address {
            id, name: input.name.trim().to_string(), phone: input.phone.trim().to_string(),
            address_line1: input.address_line1.trim().to_string(),
            address_line2: input.address_line2.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()),
            city: input.city.trim().to_string(), state: input.state.trim().to_string(),
            pincode: input.pincode.trim().to_string(), is_default: input.is_default,
        });
        &self.addresses[self.addresses.len() - 1]
    }

    pub fn update(&mut self, id: Uuid, update: AddressUpdate) -> Result<&Address, AddressError> {
        let idx = self.position(id)?;
        if update.is_default == Some(true) { self.clear_default(); }
        let addr = &mut self.addresses[idx];
        if let Some(v) = update.name { addr.name = v.trim().to_string(); }
        if let Some(v) = update.phone { addr.phone = v.trim().to_string(); }
        if let Some(v) = update.address_line1 { addr.address_line1 = v.trim().to_string(); }
        if let Some(v) = update.address_line2 { addr.address_line2 = Some(v.trim().to_string()).filter(|l| !l.is_empty()); }
        if let Some(v) = update.city { addr.city = v.trim().to_string(); }
        if let Some(v) = update.state { addr.state = v.trim().to_string(); }
        if let Some(v) = update.pincode { addr.pincode = v.trim().to_string(); }
        if let Some(v) = update.is_default { addr.is_default = v; }
        Ok(&self.addresses[idx])
    }

    /// Returns whether an entry was removed.
    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.addresses.len();
        self.addresses.retain(|a| a.id != id);
        self.addresses.len() != before
    }

    pub fn set_default(&mut self, id: Uuid) -> Result<(), AddressError> {
        let idx = self.position(id)?;
        self.clear_default();
        self.addresses[idx].is_default = true;
        Ok(())
    }

    fn position(&self, id: Uuid) -> Result<usize, AddressError> {
        self.addresses.iter().position(|a| a.id == id).ok_or(AddressError::NotFound)
    }

    fn clear_default(&mut self) { self.addresses.iter_mut().for_each(|a| a.is_default = false); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum AddressError { NotFound }
impl std::error::Error for AddressError {}
impl std::fmt::Display for AddressError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "Address not found") }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str, is_default: bool) -> NewAddress {
        NewAddress {
            name: name.into(), phone: "9876543210".into(), address_line1: "12 MG Road".into(), address_line2: None,
            city: "Pune".into(), state: "MH".into(), pincode: "411001".into(), is_default,
        }
    }

    #[test]
    fn test_validation() {
        assert!(input("Home", false).validate().is_ok());
        let mut bad = input("Home", false);
        bad.phone = "12345".into();
        bad.pincode = "41100".into();
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("phone"));
        assert!(fields.contains_key("pincode"));
    }

    #[test]
    fn test_set_default_leaves_exactly_one() {
        let mut book = AddressBook::new(Uuid::now_v7());
        let a = book.add(input("Home", true)).id;
        let b = book.add(input("Work", false)).id;
        let c = book.add(input("Parents", true)).id;
        assert!(book.get(c).unwrap().is_default);
        assert!(!book.get(a).unwrap().is_default);
        book.set_default(b).unwrap();
        let defaults: Vec<_> = book.addresses().iter().filter(|x| x.is_default).map(|x| x.id).collect();
        assert_eq!(defaults, vec![b]);
        assert!(!book.get(a).unwrap().is_default);
        assert_eq!(book.set_default(Uuid::now_v7()), Err(AddressError::NotFound));
    }

    #[test]
    fn test_update_and_snapshot_is_independent() {
        let mut book = AddressBook::new(Uuid::now_v7());
        let id = book.add(input("Home", false)).id;
        let snapshot = ShippingAddress::from(book.get(id).unwrap());
        book.update(id, AddressUpdate { city: Some("Mumbai".into()), is_default: Some(true), ..Default::default() }).unwrap();
        assert!(book.remove(id));
        assert_eq!(snapshot.city, "Pune");
    }
}
