//! Aggregates module
pub mod address;
pub mod cart;
pub mod order;
pub mod product;
pub mod transaction;

pub use address::{Address, AddressBook, AddressError, AddressUpdate, NewAddress, ShippingAddress};
pub use cart::{Cart, CartError, CartLine};
pub use order::{Order, OrderError, OrderLine, OrderStatus};
pub use product::{Product, ProductError, StockLevels};
pub use transaction::{PaymentChannel, PaymentStatus, Transaction, TransactionError};
