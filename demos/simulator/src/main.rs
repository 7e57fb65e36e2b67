//! Two clients sharing one board, scripted end to end.
//!
//! Alice drives a full [`BoardEngine`]; Bob writes through a raw store
//! handle, standing in for a second client whose UI we never render.
//! Every step prints the board as Alice sees it, so the console shows
//! optimistic moves landing instantly and Bob's edits flowing in behind
//! the change feed's debounce window.
//!
//! Run with `RUST_LOG=debug` to watch the cache and scheduler work.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::time::sleep;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use corkboard::{
    BoardEngine, BoardSnapshot, DropTarget, EngineConfig, EntityKind, MemoryStore, MoveIntent,
    OrderingStore, PointerPoint,
};

const BOARD: &str = "release-board";

/// Let the change feed's debounce window close and the reconcile land.
const SETTLE: Duration = Duration::from_millis(100);

fn print_board(label: &str, snapshot: &BoardSnapshot) {
    println!("{label}");
    for entry in &snapshot.containers {
        let cards: Vec<&str> = entry.items.iter().map(|item| item.title.as_str()).collect();
        println!("  {:<8} [{}]", entry.container.title, cards.join(", "));
    }
    println!();
}

/// What a plain client sees: two ordered reads assembled into a snapshot.
async fn fetched_view(store: &MemoryStore) -> Result<BoardSnapshot> {
    let containers = store.list_containers(BOARD).await?;
    let container_ids: Vec<String> = containers.iter().map(|c| c.id.clone()).collect();
    let items = store.list_items(&container_ids).await?;
    Ok(BoardSnapshot::from_parts(BOARD, containers, items))
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    // The shared store stands in for the backing database.
    let store = MemoryStore::new();
    let todo = store.insert_container(BOARD, "Todo");
    let doing = store.insert_container(BOARD, "Doing");
    let done = store.insert_container(BOARD, "Done");
    let ship = store.insert_item(&todo.id, "Ship 1.0")?;
    let docs = store.insert_item(&todo.id, "Write docs")?;
    let triage = store.insert_item(&todo.id, "Triage bugs")?;
    store.insert_item(&doing.id, "Review PRs")?;

    let alice = store.handle_for_actor("alice");
    let engine = BoardEngine::open(
        Arc::new(alice.clone()),
        Arc::new(alice),
        BOARD,
        EngineConfig::default(),
    )
    .await?;
    print_board("Alice opens the board:", &engine.snapshot().await);

    // A drag within Todo: "Ship 1.0" drops onto "Write docs" and takes
    // its slot. The snapshot updates before the store write finishes.
    engine
        .begin_drag(EntityKind::Item, &ship.id, PointerPoint::new(20.0, 14.0))
        .await;
    engine.pointer_moved(PointerPoint::new(20.0, 64.0)).await;
    engine.drop_on(Some(DropTarget::Item(docs.id.clone()))).await?;
    print_board("Alice files \"Ship 1.0\" after the docs:", &engine.snapshot().await);

    // Bob moves "Triage bugs" into Doing from his own client. His write
    // reaches Alice through the change feed, not through her cache.
    let bob = store.handle_for_actor("bob");
    let mut view = fetched_view(&bob).await?;
    let batch = view.apply_move(&MoveIntent {
        subject_kind: EntityKind::Item,
        subject_id: triage.id.clone(),
        source_container_id: todo.id.clone(),
        target_container_id: doing.id.clone(),
        target_index: 0,
    })?;
    bob.apply_positions(&batch).await?;
    sleep(SETTLE).await;
    print_board("Bob starts \"Triage bugs\"; Alice's view follows:", &engine.snapshot().await);

    // A cross-container drag with a live preview: the card shows up in
    // Done while the pointer is still down.
    engine
        .begin_drag(EntityKind::Item, &docs.id, PointerPoint::new(20.0, 64.0))
        .await;
    engine.pointer_moved(PointerPoint::new(220.0, 30.0)).await;
    engine.hover_over(DropTarget::Container(done.id.clone())).await;
    print_board("Mid-drag, \"Write docs\" previews in Done:", &engine.snapshot().await);
    engine.drop_on(Some(DropTarget::Container(done.id.clone()))).await?;
    print_board("Alice finishes \"Write docs\":", &engine.snapshot().await);

    // Bob deletes the card Alice is holding. Her drop is refused and the
    // board she sees matches the store again.
    engine
        .begin_drag(EntityKind::Item, &ship.id, PointerPoint::new(20.0, 14.0))
        .await;
    engine.pointer_moved(PointerPoint::new(20.0, 80.0)).await;
    bob.delete_item(&ship.id);
    sleep(SETTLE).await;
    if let Err(error) = engine.drop_on(Some(DropTarget::Container(doing.id.clone()))).await {
        info!(%error, "Alice's drop came back stale");
    }
    sleep(SETTLE).await;
    print_board("Bob deleted \"Ship 1.0\" mid-drag; Alice recovers:", &engine.snapshot().await);

    let store_view = fetched_view(&bob).await?;
    print_board("The store agrees:", &store_view);

    engine.close().await;
    Ok(())
}
