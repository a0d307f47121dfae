//! Wallet v3r2 signer
//!
//! Builds, signs and broadcasts external messages for a deployed v3r2
//! wallet, then waits for the wallet transaction through the indexer.

use super::{mnemonic, OutgoingMessage, SendMode, SigningWallet};
use crate::chain::{ChainRpc, TransactionRecord, TransactionWaiter};
use crate::config::WalletConfig;
use crate::contracts::ContractView;
use crate::error::{ExecutorError, ExecutorResult};
use crate::tvm::{self, Cell, CellBuilder, TonAddress};

use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};
use num_traits::ToPrimitive;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct WalletV3R2 {
    view: ContractView,
    signing_key: SigningKey,
    subwallet_id: u32,
    message_ttl: Duration,
    waiter: TransactionWaiter,
}

impl WalletV3R2 {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        address: TonAddress,
        signing_key: SigningKey,
        subwallet_id: u32,
        message_ttl: Duration,
        waiter: TransactionWaiter,
    ) -> Self {
        Self {
            view: ContractView::new("wallet", address, rpc),
            signing_key,
            subwallet_id,
            message_ttl,
            waiter,
        }
    }

    /// Derive the key from the configured mnemonic and check it controls the
    /// configured wallet
    pub async fn connect(
        rpc: Arc<dyn ChainRpc>,
        config: &WalletConfig,
        waiter: TransactionWaiter,
    ) -> ExecutorResult<Self> {
        let address = tvm::parse_address(&config.address)?;
        let signing_key = mnemonic::derive_signing_key(&config.mnemonic)?;

        let wallet = Self::new(
            rpc,
            address,
            signing_key,
            config.subwallet_id,
            Duration::from_secs(config.message_ttl_secs),
            waiter,
        );
        wallet.verify_public_key().await?;

        info!("Wallet {} ready", wallet.view.address());
        Ok(wallet)
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    async fn verify_public_key(&self) -> ExecutorResult<()> {
        let result = self.view.view("get_public_key", vec![]).await?;
        let (_, digits) = result.int(0)?.to_bytes_be();
        if digits.len() > 32 {
            return Err(ExecutorError::Wallet("public key wider than 256 bits".into()));
        }
        let mut on_chain = [0u8; 32];
        on_chain[32 - digits.len()..].copy_from_slice(&digits);

        if on_chain != self.public_key() {
            return Err(ExecutorError::Wallet(format!(
                "mnemonic does not control wallet {} (on-chain key {}, derived {})",
                self.view.address(),
                hex::encode(on_chain),
                hex::encode(self.public_key())
            )));
        }
        Ok(())
    }

    /// Current seqno; zero means the wallet was never deployed
    pub async fn seqno(&self) -> ExecutorResult<u32> {
        let result = self.view.view("seqno", vec![]).await?;
        let seqno = result
            .int(0)?
            .to_u32()
            .ok_or_else(|| ExecutorError::Wallet("seqno out of range".into()))?;
        if seqno == 0 {
            return Err(ExecutorError::Wallet(format!(
                "wallet {} is not deployed",
                self.view.address()
            )));
        }
        Ok(seqno)
    }

    /// `int_msg_info` with the body in a ref
    pub fn build_internal_message(message: &OutgoingMessage) -> ExecutorResult<Cell> {
        let mut builder = CellBuilder::new();
        builder
            .store_bit(false)? // int_msg_info$0
            .store_bit(true)? // ihr_disabled
            .store_bit(message.bounce)?
            .store_bit(false)? // bounced
            .store_u8(2, 0)? // src: addr_none
            .store_address(&message.destination)?
            .store_coins(&tvm::coins(message.value))?
            .store_bit(false)? // no extra currencies
            .store_coins(&tvm::coins(0))? // ihr_fee
            .store_coins(&tvm::coins(0))? // fwd_fee
            .store_u64(64, 0)? // created_lt
            .store_u32(32, 0)? // created_at
            .store_bit(false)? // no state init
            .store_bit(true)?
            .store_reference(&Arc::new(message.body.clone()))?;
        Ok(builder.build()?)
    }

    /// `subwallet_id valid_until seqno mode ^internal`, the part covered by
    /// the signature
    fn store_order(
        &self,
        builder: &mut CellBuilder,
        seqno: u32,
        valid_until: u32,
        mode: SendMode,
        internal: &Arc<Cell>,
    ) -> ExecutorResult<()> {
        builder
            .store_u32(32, self.subwallet_id)?
            .store_u32(32, valid_until)?
            .store_u32(32, seqno)?
            .store_u8(8, mode.bits())?
            .store_reference(internal)?;
        Ok(())
    }

    /// Signed wallet body carrying one internal message
    pub fn build_signed_body(
        &self,
        seqno: u32,
        valid_until: u32,
        mode: SendMode,
        internal: Cell,
    ) -> ExecutorResult<Cell> {
        let internal = Arc::new(internal);

        let mut unsigned = CellBuilder::new();
        self.store_order(&mut unsigned, seqno, valid_until, mode, &internal)?;
        let signature = self.signing_key.sign(unsigned.build()?.cell_hash().as_ref());

        let mut body = CellBuilder::new();
        body.store_slice(&signature.to_bytes())?;
        self.store_order(&mut body, seqno, valid_until, mode, &internal)?;
        Ok(body.build()?)
    }

    /// `ext_in_msg_info` addressed to the wallet
    pub fn build_external_message(&self, body: Cell) -> ExecutorResult<Cell> {
        let mut builder = CellBuilder::new();
        builder
            .store_u8(2, 0b10)?
            .store_u8(2, 0)? // src: addr_none
            .store_address(self.view.address())?
            .store_coins(&tvm::coins(0))? // import_fee
            .store_bit(false)? // no state init
            .store_bit(true)?
            .store_reference(&Arc::new(body))?;
        Ok(builder.build()?)
    }

    fn valid_until(&self) -> u32 {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        (now + self.message_ttl.as_secs()).min(u32::MAX as u64) as u32
    }
}

#[async_trait]
impl SigningWallet for WalletV3R2 {
    fn address(&self) -> TonAddress {
        self.view.address().clone()
    }

    async fn send_and_wait(
        &self,
        message: OutgoingMessage,
        cancel: &CancellationToken,
    ) -> ExecutorResult<Option<TransactionRecord>> {
        let seqno = self.seqno().await?;
        let internal = Self::build_internal_message(&message)?;
        let body = self.build_signed_body(seqno, self.valid_until(), message.mode, internal)?;
        let external = self.build_external_message(body)?;
        let payload = tvm::to_boc(&external)?;

        let msg_hash = self.view.rpc().send_message(payload).await?;
        info!(
            "Wallet {} sent {} nanoton to {} (seqno {}, message {})",
            self.view.address(),
            message.value,
            message.destination,
            seqno,
            msg_hash
        );

        let tx = self.waiter.wait_for(&msg_hash, cancel).await?;
        if tx.is_none() {
            debug!("Message {} not seen within {:?}", msg_hash, self.waiter.timeout());
        }
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ComputePhase, MockChainRpc, StackValue, ViewResult};
    use crate::tvm::tests::{address, empty_cell};
    use ed25519_dalek::{Signature, Verifier};
    use num_bigint::{BigInt, BigUint, Sign};

    fn key() -> SigningKey {
        SigningKey::from_bytes(&[7u8; 32])
    }

    fn wallet(rpc: MockChainRpc) -> WalletV3R2 {
        let rpc: Arc<dyn ChainRpc> = Arc::new(rpc);
        let waiter = TransactionWaiter::new(
            rpc.clone(),
            Duration::from_millis(1),
            Duration::from_secs(1),
        );
        WalletV3R2::new(
            rpc,
            address(0xaa),
            key(),
            698_983_191,
            Duration::from_secs(60),
            waiter,
        )
    }

    fn message() -> OutgoingMessage {
        OutgoingMessage {
            mode: SendMode::PAY_GAS_SEPARATELY,
            destination: address(0xbb),
            bounce: true,
            value: 9_000_000,
            body: empty_cell(),
        }
    }

    fn int_result(value: BigInt) -> ViewResult {
        ViewResult {
            exit_code: 0,
            stack: vec![StackValue::Int(value)],
        }
    }

    #[test]
    fn test_internal_message_layout() {
        let cell = WalletV3R2::build_internal_message(&message()).unwrap();
        let mut slice = cell.parser();

        assert!(!slice.load_bit().unwrap());
        assert!(slice.load_bit().unwrap());
        assert!(slice.load_bit().unwrap()); // bounce
        assert!(!slice.load_bit().unwrap());
        assert_eq!(slice.load_u8(2).unwrap(), 0);
        assert_eq!(slice.load_address().unwrap(), address(0xbb));
        assert_eq!(slice.load_coins().unwrap(), BigUint::from(9_000_000u32));
        assert_eq!(cell.references().len(), 1);
    }

    #[test]
    fn test_signed_body_verifies() {
        let w = wallet(MockChainRpc::new());
        let internal = WalletV3R2::build_internal_message(&message()).unwrap();
        let body = w
            .build_signed_body(5, 1_700_000_000, SendMode::PAY_GAS_SEPARATELY, internal.clone())
            .unwrap();

        let mut slice = body.parser();
        let sig_bytes = slice.load_bytes(64).unwrap();
        assert_eq!(slice.load_u32(32).unwrap(), 698_983_191);
        assert_eq!(slice.load_u32(32).unwrap(), 1_700_000_000);
        assert_eq!(slice.load_u32(32).unwrap(), 5);
        assert_eq!(slice.load_u8(8).unwrap(), 1);
        assert_eq!(*body.references()[0], internal);

        // Rebuild what was signed and check the signature
        let mut unsigned = CellBuilder::new();
        w.store_order(
            &mut unsigned,
            5,
            1_700_000_000,
            SendMode::PAY_GAS_SEPARATELY,
            &Arc::new(internal),
        )
        .unwrap();
        let unsigned = unsigned.build().unwrap();

        let mut sig = [0u8; 64];
        sig.copy_from_slice(&sig_bytes);
        key()
            .verifying_key()
            .verify(unsigned.cell_hash().as_ref(), &Signature::from_bytes(&sig))
            .unwrap();
    }

    #[test]
    fn test_external_message_targets_wallet() {
        let w = wallet(MockChainRpc::new());
        let external = w.build_external_message(empty_cell()).unwrap();
        let mut slice = external.parser();

        assert_eq!(slice.load_u8(2).unwrap(), 0b10);
        assert_eq!(slice.load_u8(2).unwrap(), 0);
        assert_eq!(slice.load_address().unwrap(), address(0xaa));
        assert_eq!(external.references().len(), 1);
    }

    #[tokio::test]
    async fn test_verify_public_key() {
        let expected = key().verifying_key().to_bytes();
        let mut rpc = MockChainRpc::new();
        rpc.expect_run_get_method()
            .withf(|_, method, _, _| method == "get_public_key")
            .returning(move |_, _, _, _| {
                Ok(int_result(BigInt::from_bytes_be(Sign::Plus, &expected)))
            });
        assert!(wallet(rpc).verify_public_key().await.is_ok());

        let mut rpc = MockChainRpc::new();
        rpc.expect_run_get_method()
            .returning(|_, _, _, _| Ok(int_result(BigInt::from(12345))));
        let err = wallet(rpc).verify_public_key().await.unwrap_err();
        assert!(err.to_string().contains("does not control"));
    }

    #[tokio::test]
    async fn test_undeployed_wallet_is_rejected() {
        let mut rpc = MockChainRpc::new();
        rpc.expect_run_get_method()
            .withf(|_, method, _, _| method == "seqno")
            .returning(|_, _, _, _| Ok(int_result(BigInt::from(0))));

        let err = wallet(rpc).seqno().await.unwrap_err();
        assert!(err.to_string().contains("not deployed"));
    }

    #[tokio::test]
    async fn test_send_and_wait_broadcasts_and_waits() {
        let mut rpc = MockChainRpc::new();
        rpc.expect_run_get_method()
            .withf(|_, method, _, _| method == "seqno")
            .returning(|_, _, _, _| Ok(int_result(BigInt::from(3))));
        rpc.expect_send_message()
            .times(1)
            .withf(|payload| tvm::from_boc(payload).is_ok())
            .returning(|_| Ok("ext-hash".to_string()));
        rpc.expect_transactions_by_message()
            .withf(|hash| hash == "ext-hash")
            .returning(|_| {
                Ok(vec![TransactionRecord {
                    account: address(0xaa).to_hex(),
                    hash: "wallet-tx".into(),
                    lt: 1,
                    aborted: false,
                    compute_phase: Some(ComputePhase::Executed {
                        success: true,
                        exit_code: 0,
                    }),
                    out_msg_hashes: vec!["bridge-msg".into()],
                }])
            });

        let w = wallet(rpc);
        assert_eq!(w.address(), address(0xaa));
        let tx = w
            .send_and_wait(message(), &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tx.hash, "wallet-tx");
    }
}
