//! Gasless Solana payment construction.
//!
//! Builds the `X-PAYMENT` transaction for the x402 `exact` scheme: an SPL
//! `TransferChecked` of the owed amount from the caller's associated token
//! account to the payee's, with the facilitator as fee payer. The caller
//! signs only its own slot; the fee-payer slot is left as a default-signature
//! placeholder so the wire format carries the required signature count and
//! the facilitator can co-sign and broadcast.

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_compute_budget_interface::ComputeBudgetInstruction;
use solana_instruction::{AccountMeta, Instruction};
use solana_keypair::Keypair;
use solana_message::v0::Message as MessageV0;
use solana_message::VersionedMessage;
use solana_pubkey::{pubkey, Pubkey};
use solana_signature::Signature;
use solana_signer::Signer;
use solana_transaction::versioned::VersionedTransaction;
use std::collections::HashMap;
use std::sync::Arc;

use x402_retrieval::server::x402::derive_ata;
use x402_retrieval::types::{
    ExactSolanaPayload, PaymentPayload, PaymentRequirements, Scheme, SolanaNetwork,
};
use x402_retrieval::util::Base64Bytes;

const SYSTEM_PROGRAM_ID: Pubkey = pubkey!("11111111111111111111111111111111");
const ATA_PROGRAM_PUBKEY: Pubkey = pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// Compute-budget defaults for the payment transaction. The facilitator caps
/// the price it will co-sign, so zero priority keeps the payment maximally
/// acceptable.
const DEFAULT_COMPUTE_UNIT_LIMIT: u32 = 200_000;
const DEFAULT_COMPUTE_UNIT_PRICE: u64 = 0;

/// Errors that can occur while constructing or applying an x402 payment.
#[derive(Debug, thiserror::Error)]
pub enum X402PaymentsError {
    /// The 402 body offered no requirement this wallet can satisfy.
    #[error("No suitable payment requirement found in 402 response")]
    NoSuitablePaymentMethod,
    /// The original request could not be cloned for the payment retry,
    /// typically a streaming body.
    #[error("Request object is not cloneable. Are you passing a streaming body?")]
    RequestNotCloneable,
    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),
    #[error("Unknown network '{0}'. Provide an RPC endpoint for it.")]
    UnknownNetwork(String),
    #[error("requirements.extra.feePayer is required for the gasless flow")]
    MissingFeePayer,
    /// RPC, compile, or signing failures while building the transaction.
    #[error("Failed to sign payment payload: {0}")]
    SigningError(String),
    #[error("Failed to encode payment payload to json")]
    JsonEncodeError(#[source] serde_json::Error),
    #[error("Failed to encode payment payload to HTTP header")]
    HeaderValueEncodeError(#[source] http::header::InvalidHeaderValue),
}

/// A wallet able to satisfy x402 payment requirements.
#[async_trait]
pub trait SenderWallet: Send + Sync {
    /// Can this wallet pay on the requirement's network and scheme?
    fn can_handle(&self, requirements: &PaymentRequirements) -> bool;

    /// Builds the payment payload for a selected requirement.
    async fn payment_payload(
        &self,
        selected: PaymentRequirements,
    ) -> Result<PaymentPayload, X402PaymentsError>;
}

/// Default RPC endpoints per network.
fn default_rpc_endpoints() -> HashMap<SolanaNetwork, String> {
    HashMap::from([
        (
            SolanaNetwork::Solana,
            "https://api.mainnet-beta.solana.com".to_string(),
        ),
        (
            SolanaNetwork::SolanaDevnet,
            "https://api.devnet.solana.com".to_string(),
        ),
    ])
}

/// [`SenderWallet`] holding an Ed25519 keypair and paying with classic SPL
/// token transfers.
pub struct SolanaPayerWallet {
    keypair: Arc<Keypair>,
    rpc_by_network: HashMap<SolanaNetwork, String>,
    asset_decimals: u8,
    compute_unit_limit: u32,
    compute_unit_price: u64,
}

impl SolanaPayerWallet {
    pub fn new(keypair: Arc<Keypair>) -> Self {
        Self {
            keypair,
            rpc_by_network: default_rpc_endpoints(),
            asset_decimals: 6,
            compute_unit_limit: DEFAULT_COMPUTE_UNIT_LIMIT,
            compute_unit_price: DEFAULT_COMPUTE_UNIT_PRICE,
        }
    }

    /// Overrides the RPC endpoint for a network.
    pub fn with_rpc(mut self, network: SolanaNetwork, url: impl Into<String>) -> Self {
        self.rpc_by_network.insert(network, url.into());
        self
    }

    /// Overrides the asset decimals used in `TransferChecked` (USDC is 6).
    pub fn with_asset_decimals(mut self, decimals: u8) -> Self {
        self.asset_decimals = decimals;
        self
    }

    pub fn address(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Ensures the caller's own ATA for `mint` exists.
    ///
    /// When missing, submits a standalone idempotent-create transaction paid
    /// and signed by the caller, then proceeds. Two concurrent first-time
    /// payers both observe a missing account and both submit; the idempotent
    /// instruction absorbs the race on-chain.
    async fn ensure_source_ata(
        &self,
        rpc: &RpcClient,
        mint: &Pubkey,
    ) -> Result<Pubkey, X402PaymentsError> {
        let owner = self.keypair.pubkey();
        let ata = derive_ata(&owner, mint);

        let existing = rpc
            .get_account_with_commitment(&ata, rpc.commitment())
            .await
            .map_err(|e| X402PaymentsError::SigningError(format!("{e}")))?
            .value;
        if existing.is_some() {
            return Ok(ata);
        }

        let create = create_ata_idempotent_instruction(&owner, &owner, mint);
        let recent_blockhash = rpc
            .get_latest_blockhash()
            .await
            .map_err(|e| X402PaymentsError::SigningError(format!("{e}")))?;
        let message = MessageV0::try_compile(&owner, &[create], &[], recent_blockhash)
            .map_err(|e| X402PaymentsError::SigningError(format!("{e:?}")))?;
        let transaction = VersionedTransaction::try_new(
            VersionedMessage::V0(message),
            &[self.keypair.as_ref()],
        )
        .map_err(|e| X402PaymentsError::SigningError(format!("{e}")))?;
        let signature = rpc
            .send_transaction(&transaction)
            .await
            .map_err(|e| X402PaymentsError::SigningError(format!("{e}")))?;
        tracing::info!(%ata, %signature, "created missing source token account");
        Ok(ata)
    }
}

#[async_trait]
impl SenderWallet for SolanaPayerWallet {
    fn can_handle(&self, requirements: &PaymentRequirements) -> bool {
        requirements.scheme == Scheme::Exact
            && self.rpc_by_network.contains_key(&requirements.network)
    }

    async fn payment_payload(
        &self,
        selected: PaymentRequirements,
    ) -> Result<PaymentPayload, X402PaymentsError> {
        if selected.scheme != Scheme::Exact {
            return Err(X402PaymentsError::UnsupportedScheme(
                selected.scheme.to_string(),
            ));
        }
        let rpc_url = self
            .rpc_by_network
            .get(&selected.network)
            .ok_or_else(|| X402PaymentsError::UnknownNetwork(selected.network.to_string()))?;
        let fee_payer: Pubkey = selected
            .extra
            .as_ref()
            .map(|extra| extra.fee_payer.into())
            .ok_or(X402PaymentsError::MissingFeePayer)?;

        let rpc = RpcClient::new(rpc_url.clone());
        let owner = self.keypair.pubkey();
        let mint: Pubkey = selected.asset.into();
        let recipient: Pubkey = selected.pay_to.into();
        let amount = selected.max_amount_required.inner();

        // Source ATA must exist before the facilitator simulates the
        // transfer; bootstrap it in a separate self-paid transaction.
        let source_ata = self.ensure_source_ata(&rpc, &mint).await?;

        // The recipient ATA is derived, not created by us; if it is missing,
        // piggy-back an idempotent create funded by the fee payer.
        let destination_ata = derive_ata(&recipient, &mint);
        let destination_exists = rpc
            .get_account_with_commitment(&destination_ata, rpc.commitment())
            .await
            .map_err(|e| X402PaymentsError::SigningError(format!("{e}")))?
            .value
            .is_some();

        let transfer = spl_token::instruction::transfer_checked(
            &spl_token::ID,
            &source_ata,
            &mint,
            &destination_ata,
            &owner,
            &[],
            amount,
            self.asset_decimals,
        )
        .map_err(|e| X402PaymentsError::SigningError(format!("{e}")))?;

        // Order: [CU limit] + [CU price] + [create dest ATA?] + transfer.
        let mut instructions = vec![
            ComputeBudgetInstruction::set_compute_unit_limit(self.compute_unit_limit),
            ComputeBudgetInstruction::set_compute_unit_price(self.compute_unit_price),
        ];
        if !destination_exists {
            instructions.push(create_ata_idempotent_instruction(
                &fee_payer, &recipient, &mint,
            ));
        }
        instructions.push(transfer);

        let recent_blockhash = rpc
            .get_latest_blockhash()
            .await
            .map_err(|e| X402PaymentsError::SigningError(format!("{e}")))?;
        let message = MessageV0::try_compile(&fee_payer, &instructions, &[], recent_blockhash)
            .map_err(|e| X402PaymentsError::SigningError(format!("{e:?}")))?;
        let transaction = VersionedTransaction {
            signatures: vec![],
            message: VersionedMessage::V0(message),
        };
        let transaction = partially_sign(transaction, self.keypair.as_ref())?;

        let bytes = bincode::serialize(&transaction)
            .map_err(|e| X402PaymentsError::SigningError(format!("{e}")))?;
        let transaction_b64 = Base64Bytes::encode(bytes).to_string();

        Ok(PaymentPayload {
            x402_version: x402_retrieval::types::X402Version::V1,
            scheme: Scheme::Exact,
            network: selected.network,
            payload: ExactSolanaPayload {
                transaction: transaction_b64,
            },
        })
    }
}

/// Idempotent associated-token-account creation.
///
/// Account layout and the `CreateIdempotent` discriminator (1) follow the ATA
/// program ABI: payer, ata, owner, mint, system program, token program.
pub fn create_ata_idempotent_instruction(
    funding: &Pubkey,
    owner: &Pubkey,
    mint: &Pubkey,
) -> Instruction {
    let ata = derive_ata(owner, mint);
    Instruction {
        program_id: ATA_PROGRAM_PUBKEY,
        accounts: vec![
            AccountMeta::new(*funding, true),
            AccountMeta::new(ata, false),
            AccountMeta::new_readonly(*owner, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
            AccountMeta::new_readonly(spl_token::ID, false),
        ],
        data: vec![1],
    }
}

/// Signs the signer's slot and leaves every other required slot as a
/// default-signature placeholder, so the serialized transaction still carries
/// `num_required_signatures` entries for the facilitator to fill.
pub fn partially_sign(
    transaction: VersionedTransaction,
    signer: &Keypair,
) -> Result<VersionedTransaction, X402PaymentsError> {
    let mut tx = transaction;
    let message_bytes = tx.message.serialize();
    let signature = signer.sign_message(message_bytes.as_slice());

    // Required signatures are the first N account keys.
    let num_required = tx.message.header().num_required_signatures as usize;
    let static_keys = tx.message.static_account_keys();

    let position = static_keys[..num_required]
        .iter()
        .position(|key| *key == signer.pubkey())
        .ok_or_else(|| {
            X402PaymentsError::SigningError("Signer not found in required signers".to_string())
        })?;

    if tx.signatures.len() < num_required {
        tx.signatures.resize(num_required, Signature::default());
    }
    tx.signatures[position] = signature;
    Ok(tx)
}
