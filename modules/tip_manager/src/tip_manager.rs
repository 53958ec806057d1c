//! Tangle tip manager module for Caryatid
//! Tracks the tips new blocks may reference, deferring blocks that commit to
//! epochs which are not yet committable

pub mod configuration;
pub mod eviction;
pub mod future_tips;
pub mod issuance;
pub mod manager;
pub mod marker_oracle;
pub mod tip_error;
pub mod tip_observer;
pub mod tip_pool;
pub mod tsc;

use std::sync::Arc;

use anyhow::Result;
use caryatid_sdk::{module, Context};
use config::Config;
use tangle_common::{
    messages::{BookerMessage, Message, TangleMessage, TipsMessage},
    BlockId, CommitmentRef, EpochIndex,
};
use tracing::{debug, error, info, info_span, warn, Instrument};

use configuration::TipManagerConfig;
use eviction::EvictionState;
use manager::TipManager;
use marker_oracle::MarkerCache;
use tip_observer::TipManagerObserver;

const DEFAULT_SUBSCRIBE_TANGLE_TOPIC: &str = "tangle.blocks";
const DEFAULT_SUBSCRIBE_BOOKER_TOPIC: &str = "tangle.booker";
const DEFAULT_PUBLISH_TIPS_TOPIC: &str = "tangle.tips";

/// Shared event queue between the observer and the main loop.
type EventQueue = Arc<std::sync::Mutex<Vec<TipsMessage>>>;

/// Observer that queues tip events for later async publishing.
struct QueueObserver {
    events: EventQueue,
}

impl QueueObserver {
    fn push(&self, message: TipsMessage) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).push(message);
    }
}

impl TipManagerObserver for QueueObserver {
    fn tip_added(&self, block: BlockId) {
        self.push(TipsMessage::TipAdded(block));
    }

    fn tip_removed(&self, block: BlockId) {
        self.push(TipsMessage::TipRemoved(block));
    }

    fn future_tip_added(&self, block: BlockId, commitment: CommitmentRef) {
        self.push(TipsMessage::FutureTipAdded { block, commitment });
    }

    fn future_tips_promoted(&self, index: EpochIndex, blocks: &[BlockId]) {
        self.push(TipsMessage::FutureTipsPromoted {
            index,
            blocks: blocks.to_vec(),
        });
    }

    fn future_tips_dropped(&self, blocks: &[BlockId]) {
        self.push(TipsMessage::FutureTipsDropped(blocks.to_vec()));
    }
}

/// Tip manager module
/// Parameterised by the outer message enum used on the bus
#[module(
    message_type(Message),
    name = "tip-manager",
    description = "Tangle tip selection and future tip buffering"
)]
pub struct TipManagerModule;

impl TipManagerModule {
    /// Main init function
    pub async fn init(&self, context: Arc<Context<Message>>, config: Arc<Config>) -> Result<()> {
        // Get configuration
        let subscribe_tangle_topic = config
            .get_string("subscribe-tangle-topic")
            .unwrap_or(DEFAULT_SUBSCRIBE_TANGLE_TOPIC.to_string());
        info!("Creating tangle subscriber on '{subscribe_tangle_topic}'");

        let subscribe_booker_topic = config
            .get_string("subscribe-booker-topic")
            .unwrap_or(DEFAULT_SUBSCRIBE_BOOKER_TOPIC.to_string());
        info!("Creating booker subscriber on '{subscribe_booker_topic}'");

        let publish_tips_topic = config
            .get_string("publish-tips-topic")
            .unwrap_or(DEFAULT_PUBLISH_TIPS_TOPIC.to_string());
        info!("Publishing tips on '{publish_tips_topic}'");

        let tip_config = TipManagerConfig::from_config(&config)?;
        info!(
            "TSC threshold {}, max past marker distance {}",
            tip_config.time_since_confirmation_threshold, tip_config.max_past_marker_distance
        );

        let mut tangle_subscription = context.subscribe(&subscribe_tangle_topic).await?;
        let mut booker_subscription = context.subscribe(&subscribe_booker_topic).await?;

        let cache = Arc::new(MarkerCache::new());
        let eviction = Arc::new(EvictionState::new());
        let event_queue: EventQueue = Arc::new(std::sync::Mutex::new(Vec::new()));
        let observer = Box::new(QueueObserver {
            events: event_queue.clone(),
        });
        let manager = TipManager::new(&tip_config, cache.clone(), eviction.clone(), observer);
        manager.start();

        context.clone().run(async move {
            loop {
                // Booker facts first, so a block is booked before it is attached
                tokio::select! {
                    biased;

                    result = booker_subscription.read() => {
                        let Ok((_, message)) = result else {
                            error!("Booker message read failed");
                            return;
                        };

                        match message.as_ref() {
                            Message::Booker(booker_message) => handle_booker(&cache, booker_message),
                            _ => debug!("Ignoring non-booker message on booker topic"),
                        }
                    }

                    result = tangle_subscription.read() => {
                        let Ok((_, message)) = result else {
                            error!("Tangle message read failed");
                            return;
                        };

                        let Message::Tangle(tangle_message) = message.as_ref() else {
                            debug!("Ignoring non-tangle message on tangle topic");
                            continue;
                        };

                        let span = info_span!("tip_manager", message = message_name(tangle_message));
                        async {
                            handle_tangle(&manager, &cache, &eviction, tangle_message);

                            let events: Vec<TipsMessage> = event_queue
                                .lock()
                                .unwrap_or_else(|e| e.into_inner())
                                .drain(..)
                                .collect();
                            for event in events {
                                context
                                    .message_bus
                                    .publish(&publish_tips_topic, Arc::new(Message::Tips(event)))
                                    .await
                                    .unwrap_or_else(|e| error!("Failed to publish tip event: {e}"));
                            }
                        }
                        .instrument(span)
                        .await;
                    }
                }
            }
        });

        Ok(())
    }
}

/// Feed booker output into the marker cache.
fn handle_booker(cache: &MarkerCache, message: &BookerMessage) {
    match message {
        BookerMessage::BlockBooked(booked) => {
            cache.book_block(booked.block, booked.issuing_time, booked.markers.clone());
        }
        BookerMessage::MarkerBooked(booked) => {
            cache.book_marker(
                booked.marker,
                booked.block,
                booked.issuing_time,
                booked.past_markers.clone(),
            );
        }
        BookerMessage::MarkerAccepted(marker) => cache.set_marker_accepted(*marker),
    }
}

/// Route a tangle event to the tip manager. Failures are logged; the loop
/// carries on with the next message.
fn handle_tangle(
    manager: &TipManager,
    cache: &MarkerCache,
    eviction: &EvictionState,
    message: &TangleMessage,
) {
    let result = match message {
        TangleMessage::BlockAttached(attached) => manager
            .process_block_attached(attached)
            .map(|admission| debug!("Block {} admitted as {admission:?}", attached.block)),
        TangleMessage::BlockAccepted(accepted) => {
            cache.set_block_accepted(&accepted.block);
            manager.process_block_accepted(accepted).map(|_| ())
        }
        TangleMessage::AcceptedTimeUpdated(updated) => {
            manager.process_accepted_time_updated(updated.time)
        }
        TangleMessage::EpochCommitted(committed) => {
            manager.process_epoch_committed(committed.commitment).map(|_| ())
        }
        TangleMessage::EpochEvicted(evicted) => manager
            .evict_epoch(evicted.index)
            .map(|()| cache.evict_until(evicted.index)),
        TangleMessage::RootBlockAdded(block) => {
            eviction.add_root_block(*block);
            Ok(())
        }
        TangleMessage::RootBlockRemoved(block) => {
            eviction.remove_root_block(block);
            Ok(())
        }
        TangleMessage::Shutdown => {
            manager.shutdown();
            Ok(())
        }
    };

    if let Err(e) = result {
        warn!("Tangle event rejected: {e}");
    }
}

fn message_name(message: &TangleMessage) -> &'static str {
    match message {
        TangleMessage::BlockAttached(_) => "block_attached",
        TangleMessage::BlockAccepted(_) => "block_accepted",
        TangleMessage::AcceptedTimeUpdated(_) => "accepted_time_updated",
        TangleMessage::EpochCommitted(_) => "epoch_committed",
        TangleMessage::EpochEvicted(_) => "epoch_evicted",
        TangleMessage::RootBlockAdded(_) => "root_block_added",
        TangleMessage::RootBlockRemoved(_) => "root_block_removed",
        TangleMessage::Shutdown => "shutdown",
    }
}
