pub mod memory;
pub mod metrics;
pub mod processor;
pub mod repository;
pub mod store;

pub use memory::InMemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use processor::{AvailableGateways, BankTransferSubmission, PaymentProcessor, TransactionPage};
pub use repository::PaymentRepository;
pub use store::{AttemptLog, PendingPaymentStore, Storage, WalletLedger};
