pub mod attempt;
pub mod ledger;
pub mod payment;
pub mod pending;

pub use attempt::{AttemptOperation, PaymentAttempt};
pub use ledger::{LedgerTransaction, TransactionKind, TransactionStatus};
pub use payment::{
    GatewayType, PaymentMetadata, PaymentRequest, PaymentResponse, PaymentStatus,
    PaymentVerification, WebhookValidation,
};
pub use pending::{PendingPayment, PendingPaymentStatus, PENDING_PAYMENT_TTL_HOURS};
