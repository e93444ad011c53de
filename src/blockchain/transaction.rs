use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use utoipa::ToSchema;

use super::crypto::{verify_signature, Address, CryptoError, DigitalSignature, Wallet};

/// Sender value carried by reward transactions on the wire
pub const MINING_SENDER: &str = "MINING";

/// Action label of reward transactions created by this node
pub const MINING_ACTION: &str = "Mining";

/// Errors that can occur during transaction operations
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Invalid transaction record: {0}")]
    InvalidRecord(String),

    #[error("Crypto error: {0}")]
    CryptoError(#[from] CryptoError),

    #[error("System error: {0}")]
    SystemError(String),
}

/// Flat transaction record used on the wire and in the state store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TransactionRecord {
    /// Sender's address, or `MINING` for rewards
    pub sender: String,

    /// Recipient's address
    pub recipient: String,

    /// Base58 signature, empty for rewards
    #[serde(default)]
    pub signature: String,

    /// Amount being transferred
    pub amount: f64,

    /// Free-form label
    #[serde(default)]
    pub action: String,
}

/// A value transfer recorded in the ledger.
///
/// Rewards are unsigned and issued by the `MINING` sentinel; every other
/// transaction is a signed transfer between two addresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TransactionRecord", into = "TransactionRecord")]
pub enum Transaction {
    Transfer {
        sender: Address,
        recipient: Address,
        amount: f64,
        action: String,
        signature: DigitalSignature,
    },
    Reward {
        recipient: Address,
        amount: f64,
        action: String,
    },
}

/// Field order here is the canonical signing layout
#[derive(Serialize)]
struct SigningPayload<'a> {
    sender: &'a str,
    recipient: &'a str,
    amount: f64,
    action: &'a str,
}

impl Transaction {
    /// Builds a transaction from its wire fields.
    ///
    /// This is the only constructor for peer and client input: a `MINING`
    /// sender yields a reward, anything else a transfer.
    pub fn new(
        sender: &str,
        recipient: &str,
        signature: &str,
        amount: f64,
        action: &str,
    ) -> Self {
        if sender == MINING_SENDER {
            Transaction::Reward {
                recipient: Address::from(recipient),
                amount,
                action: action.to_string(),
            }
        } else {
            Transaction::Transfer {
                sender: Address::from(sender),
                recipient: Address::from(recipient),
                amount,
                action: action.to_string(),
                signature: DigitalSignature(signature.to_string()),
            }
        }
    }

    /// Creates a fresh mining reward for `recipient`
    pub fn new_reward(recipient: Address, amount: f64) -> Self {
        Transaction::Reward {
            recipient,
            amount,
            action: MINING_ACTION.to_string(),
        }
    }

    /// Creates a transfer from `wallet` signed over the canonical digest
    pub fn new_signed(wallet: &Wallet, recipient: Address, amount: f64, action: &str) -> Self {
        let digest = Self::canonical_digest(wallet.address().as_str(), recipient.as_str(), amount, action);
        let signature = wallet.sign(&digest);

        Transaction::Transfer {
            sender: wallet.address().clone(),
            recipient,
            amount,
            action: action.to_string(),
            signature,
        }
    }

    /// SHA-256 over the canonical (sender, recipient, amount, action) layout
    pub fn canonical_digest(sender: &str, recipient: &str, amount: f64, action: &str) -> [u8; 32] {
        let payload = SigningPayload {
            sender,
            recipient,
            amount,
            action,
        };
        // Serializing a plain struct of strings and an f64 cannot fail
        let bytes = serde_json::to_vec(&payload).unwrap_or_default();
        Sha256::digest(&bytes).into()
    }

    /// Sender as it appears on the wire
    pub fn sender(&self) -> &str {
        match self {
            Transaction::Transfer { sender, .. } => sender.as_str(),
            Transaction::Reward { .. } => MINING_SENDER,
        }
    }

    pub fn recipient(&self) -> &str {
        match self {
            Transaction::Transfer { recipient, .. } | Transaction::Reward { recipient, .. } => {
                recipient.as_str()
            }
        }
    }

    pub fn amount(&self) -> f64 {
        match self {
            Transaction::Transfer { amount, .. } | Transaction::Reward { amount, .. } => *amount,
        }
    }

    pub fn action(&self) -> &str {
        match self {
            Transaction::Transfer { action, .. } | Transaction::Reward { action, .. } => action,
        }
    }

    pub fn is_reward(&self) -> bool {
        matches!(self, Transaction::Reward { .. })
    }

    /// Checks the transfer signature. Rewards carry none and always pass.
    pub fn verify_signature(&self) -> Result<bool, TransactionError> {
        match self {
            Transaction::Reward { .. } => Ok(true),
            Transaction::Transfer {
                sender,
                recipient,
                amount,
                action,
                signature,
            } => {
                let public_key = sender.to_public_key()?;
                let digest = Self::canonical_digest(sender.as_str(), recipient.as_str(), *amount, action);
                verify_signature(&digest, signature, &public_key).map_err(TransactionError::from)
            }
        }
    }

    pub fn to_record(&self) -> TransactionRecord {
        TransactionRecord::from(self.clone())
    }
}

impl From<Transaction> for TransactionRecord {
    fn from(transaction: Transaction) -> Self {
        match transaction {
            Transaction::Transfer {
                sender,
                recipient,
                amount,
                action,
                signature,
            } => TransactionRecord {
                sender: sender.0,
                recipient: recipient.0,
                signature: signature.0,
                amount,
                action,
            },
            Transaction::Reward {
                recipient,
                amount,
                action,
            } => TransactionRecord {
                sender: MINING_SENDER.to_string(),
                recipient: recipient.0,
                signature: String::new(),
                amount,
                action,
            },
        }
    }
}

impl TryFrom<TransactionRecord> for Transaction {
    type Error = TransactionError;

    fn try_from(record: TransactionRecord) -> Result<Self, Self::Error> {
        if record.sender == MINING_SENDER && !record.signature.is_empty() {
            return Err(TransactionError::InvalidRecord(
                "reward transactions carry no signature".to_string(),
            ));
        }

        Ok(Transaction::new(
            &record.sender,
            &record.recipient,
            &record.signature,
            record.amount,
            &record.action,
        ))
    }
}

/// Hex SHA-256 over the ordered records of `transactions`
pub fn transactions_digest(transactions: &[Transaction]) -> String {
    let records: Vec<TransactionRecord> = transactions.iter().map(Transaction::to_record).collect();
    let bytes = serde_json::to_vec(&records).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}
