//! End-to-end flows over real stores: genesis bookkeeping, spending with
//! change, catch-up between two nodes' stores, and the miner's mempool
//! drain.

use minicoin::network::operations::send_tx;
use minicoin::node::{NodeContext, miner};
use minicoin::{Blockchain, REWARD, Transaction, UTXOSet, Wallet};
use std::fs;
use std::path::Path;

fn copy_dir(src: &Path, dst: &Path) {
    fs::create_dir_all(dst).expect("Failed to create directory");
    for entry in fs::read_dir(src).expect("Failed to read directory") {
        let entry = entry.expect("Failed to read entry");
        let target = dst.join(entry.file_name());
        if entry.path().is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), &target).expect("Failed to copy file");
        }
    }
}

#[tokio::test]
async fn genesis_pays_the_reward_to_its_address() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let wallet = Wallet::new().expect("Failed to create wallet");
    let address = wallet.get_address().expect("Failed to get address");

    let blockchain = Blockchain::create(&dir.path().join("blocks"), &address)
        .await
        .expect("Failed to create blockchain");
    let utxo_set = UTXOSet::new(blockchain.clone());
    utxo_set.reindex().await.expect("Failed to reindex");

    assert_eq!(
        blockchain.get_best_height().await.expect("Failed to get height"),
        0
    );
    assert_eq!(
        utxo_set.get_balance(&address).await.expect("Failed to get balance"),
        REWARD
    );

    // A single block whose previous hash is empty, holding one coinbase.
    let hashes = blockchain.get_block_hashes().await.expect("Failed to get hashes");
    assert_eq!(hashes.len(), 1);
    let genesis = blockchain
        .get_block(hashes[0].as_slice())
        .await
        .expect("Failed to get block")
        .expect("Genesis should exist");
    assert!(genesis.get_prev_block_hash().is_empty());
    assert_eq!(genesis.get_transactions().len(), 1);
    assert!(genesis.get_transactions()[0].is_coinbase());
}

#[tokio::test]
async fn send_with_local_mining_pays_recipient_and_change() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let sender = Wallet::new().expect("Failed to create wallet");
    let recipient = Wallet::new().expect("Failed to create wallet");
    let sender_address = sender.get_address().expect("Failed to get address");
    let recipient_address = recipient.get_address().expect("Failed to get address");

    let blockchain = Blockchain::create(&dir.path().join("blocks"), &sender_address)
        .await
        .expect("Failed to create blockchain");
    let utxo_set = UTXOSet::new(blockchain.clone());
    utxo_set.reindex().await.expect("Failed to reindex");

    // The sender owns exactly one UTXO of REWARD and sends 7 of it.
    let tx = Transaction::new_utxo_transaction(&sender, &recipient_address, 7, &utxo_set)
        .await
        .expect("Failed to build transaction");
    let coinbase =
        Transaction::new_coinbase_tx(&sender_address, "").expect("Failed to create coinbase");
    let block = blockchain
        .mine_block(&[coinbase, tx])
        .await
        .expect("Failed to mine block");
    utxo_set.update(&block).await.expect("Failed to update");

    assert_eq!(block.get_transactions().len(), 2);
    assert_eq!(
        utxo_set
            .get_balance(&sender_address)
            .await
            .expect("Failed to get balance"),
        2 * REWARD - 7
    );
    assert_eq!(
        utxo_set
            .get_balance(&recipient_address)
            .await
            .expect("Failed to get balance"),
        7
    );
}

#[tokio::test]
async fn overdraft_leaves_chain_and_index_untouched() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let sender = Wallet::new().expect("Failed to create wallet");
    let recipient = Wallet::new().expect("Failed to create wallet");
    let sender_address = sender.get_address().expect("Failed to get address");
    let recipient_address = recipient.get_address().expect("Failed to get address");

    let blockchain = Blockchain::create(&dir.path().join("blocks"), &sender_address)
        .await
        .expect("Failed to create blockchain");
    let utxo_set = UTXOSet::new(blockchain.clone());
    utxo_set.reindex().await.expect("Failed to reindex");

    let result =
        Transaction::new_utxo_transaction(&sender, &recipient_address, 9999, &utxo_set).await;
    assert!(result.is_err());

    assert_eq!(
        blockchain.get_best_height().await.expect("Failed to get height"),
        0
    );
    assert_eq!(
        utxo_set
            .get_balance(&sender_address)
            .await
            .expect("Failed to get balance"),
        REWARD
    );
    assert_eq!(
        utxo_set.count_transactions().await.expect("Failed to count"),
        1
    );
}

/// Two nodes share a store snapshot at height 1; node A mines ahead to
/// height 3, and node B applies A's blocks oldest-first the way the
/// inventory fetch delivers them. B converges to A's tip and balances.
#[tokio::test]
async fn lagging_store_converges_after_block_transfer() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path_a = dir.path().join("blocks_a");
    let path_b = dir.path().join("blocks_b");

    let miner_wallet = Wallet::new().expect("Failed to create wallet");
    let miner_address = miner_wallet.get_address().expect("Failed to get address");

    // Shared history up to height 1.
    {
        let blockchain_a = Blockchain::create(&path_a, &miner_address)
            .await
            .expect("Failed to create blockchain");
        let coinbase =
            Transaction::new_coinbase_tx(&miner_address, "").expect("Failed to create coinbase");
        blockchain_a
            .mine_block(&[coinbase])
            .await
            .expect("Failed to mine block");
        blockchain_a.flush().expect("Failed to flush");
    }
    copy_dir(&path_a, &path_b);

    let blockchain_a = Blockchain::open(&path_a).await.expect("Failed to open A");
    let blockchain_b = Blockchain::open(&path_b).await.expect("Failed to open B");

    // A mines ahead.
    for _ in 0..2 {
        let coinbase =
            Transaction::new_coinbase_tx(&miner_address, "").expect("Failed to create coinbase");
        blockchain_a
            .mine_block(&[coinbase])
            .await
            .expect("Failed to mine block");
    }
    assert_eq!(blockchain_a.get_best_height().await.expect("height"), 3);
    assert_eq!(blockchain_b.get_best_height().await.expect("height"), 1);

    // B walks A's inventory tip-first, fetching and storing each block.
    let inventory = blockchain_a
        .get_block_hashes()
        .await
        .expect("Failed to get hashes");
    for hash in &inventory {
        let block = blockchain_a
            .get_block(hash.as_slice())
            .await
            .expect("Failed to get block")
            .expect("Advertised block should exist");
        blockchain_b
            .add_block(&block)
            .await
            .expect("Failed to add block");
    }
    let utxo_b = UTXOSet::new(blockchain_b.clone());
    utxo_b.reindex().await.expect("Failed to reindex");

    assert_eq!(
        blockchain_b.get_best_height().await.expect("height"),
        blockchain_a.get_best_height().await.expect("height")
    );
    assert_eq!(
        blockchain_b.get_tip_hash().await,
        blockchain_a.get_tip_hash().await
    );
    assert_eq!(
        utxo_b
            .get_balance(&miner_address)
            .await
            .expect("Failed to get balance"),
        REWARD * 4
    );
}

/// The miner loop takes what verifies, skips what does not, leads the block
/// with its own coinbase and drains the mempool. The unreachable bootstrap
/// peer gets evicted when the block announcement cannot be delivered.
#[tokio::test]
async fn miner_drains_mempool_and_drops_unreachable_peers() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let sender = Wallet::new().expect("Failed to create wallet");
    let recipient = Wallet::new().expect("Failed to create wallet");
    let miner_wallet = Wallet::new().expect("Failed to create wallet");
    let sender_address = sender.get_address().expect("Failed to get address");
    let recipient_address = recipient.get_address().expect("Failed to get address");
    let miner_address = miner_wallet.get_address().expect("Failed to get address");

    let blockchain = Blockchain::create(&dir.path().join("blocks"), &sender_address)
        .await
        .expect("Failed to create blockchain");
    let utxo_set = UTXOSet::new(blockchain.clone());
    utxo_set.reindex().await.expect("Failed to reindex");

    // Nobody listens on the bootstrap address in this test.
    let ctx = NodeContext::new(
        blockchain.clone(),
        "localhost:59001".to_string(),
        "localhost:59000".to_string(),
        Some(miner_address.clone()),
    );

    let good_tx = Transaction::new_utxo_transaction(&sender, &recipient_address, 4, &utxo_set)
        .await
        .expect("Failed to build transaction");
    // A well-formed transaction whose ancestry lives on a different chain;
    // verification against this chain cannot find its inputs.
    let bad_tx = {
        let foreign_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let foreign_chain =
            Blockchain::create(&foreign_dir.path().join("blocks"), &recipient_address)
                .await
                .expect("Failed to create blockchain");
        let foreign_utxo = UTXOSet::new(foreign_chain);
        foreign_utxo.reindex().await.expect("Failed to reindex");
        Transaction::new_utxo_transaction(&recipient, &sender_address, 3, &foreign_utxo)
            .await
            .expect("Failed to build transaction")
    };

    ctx.memory_pool().add(good_tx.clone()).expect("add failed");
    ctx.memory_pool().add(bad_tx).expect("add failed");

    miner::mine_transactions(&ctx).await.expect("Failed to mine");

    assert!(ctx.memory_pool().is_empty().expect("is_empty failed"));
    assert_eq!(blockchain.get_best_height().await.expect("height"), 1);
    assert_eq!(
        utxo_set
            .get_balance(&miner_address)
            .await
            .expect("Failed to get balance"),
        REWARD
    );
    assert_eq!(
        utxo_set
            .get_balance(&recipient_address)
            .await
            .expect("Failed to get balance"),
        4
    );
    // Dial failure dropped the bootstrap peer.
    assert!(
        !ctx.known_nodes()
            .node_is_known("localhost:59000")
            .expect("lookup failed")
    );
}

/// A send to a dead peer evicts exactly that peer.
#[tokio::test]
async fn unreachable_peer_is_evicted_on_send() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let wallet = Wallet::new().expect("Failed to create wallet");
    let address = wallet.get_address().expect("Failed to get address");

    let blockchain = Blockchain::create(&dir.path().join("blocks"), &address)
        .await
        .expect("Failed to create blockchain");
    let ctx = NodeContext::new(
        blockchain,
        "localhost:3000".to_string(),
        "localhost:3000".to_string(),
        None,
    );
    ctx.known_nodes()
        .add_node("localhost:1".to_string())
        .expect("add failed");

    let tx = Transaction::new_coinbase_tx(&address, "").expect("Failed to create coinbase");
    send_tx(&ctx, "localhost:1", &tx).await;

    assert!(!ctx.known_nodes().node_is_known("localhost:1").expect("lookup failed"));
    assert_eq!(
        ctx.known_nodes().get_nodes().expect("get failed"),
        vec!["localhost:3000".to_string()]
    );
}
