//! Core pipeline wiring for TradeFlow.
//!
//! This module assembles the capability backends into a running pipeline:
//! the order service for intake and queries, the settlement worker consuming
//! the event log, and a periodic cache sweep. Backends are created through
//! factories selected by configuration, so deployments swap implementations
//! without touching the wiring.

use flow_cache::{CacheFactory, CacheService};
use flow_config::Config;
use flow_events::{EventLogFactory, EventLogService};
use flow_orders::OrderService;
use flow_settlement::SettlementWorker;
use flow_store::{StoreFactory, StoreService};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

/// Errors that can occur while building or running the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
	/// Error related to configuration or wiring.
	#[error("Configuration error: {0}")]
	Config(String),
	/// Error from one of the pipeline services.
	#[error("Service error: {0}")]
	Service(String),
}

/// Factory functions for each capability, keyed by the implementation name
/// used in configuration.
pub struct PipelineFactories {
	pub store_factories: HashMap<String, StoreFactory>,
	pub cache_factories: HashMap<String, CacheFactory>,
	pub event_log_factories: HashMap<String, EventLogFactory>,
}

/// A fully wired order pipeline.
pub struct Pipeline {
	config: Config,
	store: Arc<StoreService>,
	cache: Arc<CacheService>,
	events: Arc<EventLogService>,
	orders: Arc<OrderService>,
}

/// Builder that constructs a [`Pipeline`] from configuration and factories.
pub struct PipelineBuilder {
	config: Config,
}

impl PipelineBuilder {
	/// Creates a new PipelineBuilder with the given configuration.
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the pipeline, creating each backend through its configured
	/// factory.
	pub fn build(self, factories: PipelineFactories) -> Result<Pipeline, PipelineError> {
		let op_timeout = self.config.pipeline.op_timeout();

		let store_backend = Self::create(
			"store",
			&self.config.store.primary,
			&self.config.store.implementations,
			&factories.store_factories,
		)?;
		let store = Arc::new(StoreService::new(store_backend, op_timeout));

		let cache_backend = Self::create(
			"cache",
			&self.config.cache.primary,
			&self.config.cache.implementations,
			&factories.cache_factories,
		)?;
		let cache = Arc::new(CacheService::new(
			cache_backend,
			self.config.cache.ttl(),
			op_timeout,
		));

		let events_backend = Self::create(
			"events",
			&self.config.events.primary,
			&self.config.events.implementations,
			&factories.event_log_factories,
		)?;
		let events = Arc::new(EventLogService::new(events_backend, op_timeout));

		let orders = Arc::new(OrderService::new(
			store.clone(),
			cache.clone(),
			events.clone(),
			self.config.events.topic.clone(),
		));

		Ok(Pipeline {
			config: self.config,
			store,
			cache,
			events,
			orders,
		})
	}

	fn create<T, E: std::fmt::Display>(
		component: &str,
		primary: &str,
		implementations: &HashMap<String, toml::Value>,
		factories: &HashMap<String, fn(&toml::Value) -> Result<T, E>>,
	) -> Result<T, PipelineError> {
		let factory = factories.get(primary).ok_or_else(|| {
			PipelineError::Config(format!(
				"No factory registered for {} implementation '{}'",
				component, primary
			))
		})?;

		let impl_config = implementations
			.get(primary)
			.cloned()
			.unwrap_or_else(|| toml::Value::Table(toml::map::Map::new()));

		let backend = factory(&impl_config).map_err(|e| {
			PipelineError::Config(format!(
				"Failed to create {} backend '{}': {}",
				component, primary, e
			))
		})?;
		tracing::info!(component = component, implementation = %primary, "Loaded");
		Ok(backend)
	}
}

impl Pipeline {
	/// Returns the order service handling intake and queries.
	pub fn orders(&self) -> &Arc<OrderService> {
		&self.orders
	}

	/// Returns a reference to the configuration.
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Constructs the settlement worker for this pipeline's event log.
	pub fn settlement_worker(&self) -> SettlementWorker {
		SettlementWorker::new(
			self.store.clone(),
			self.cache.clone(),
			self.events.clone(),
			self.config.events.topic.clone(),
			self.config.settlement.group.clone(),
			self.config.settlement.settle_delay(),
		)
	}

	/// Runs the pipeline until interrupted.
	///
	/// Spawns the settlement worker and the periodic cache sweep, then waits
	/// for ctrl-c. Shutdown is graceful for the worker (it finishes the
	/// in-flight event) and abortive for the sweep.
	pub async fn run(&self) -> Result<(), PipelineError> {
		let (shutdown_tx, shutdown_rx) = watch::channel(false);

		let worker = self.settlement_worker();
		let worker_handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

		let cache = self.cache.clone();
		let mut sweep_interval = tokio::time::interval(self.config.cache.cleanup_interval());
		let sweep_handle = tokio::spawn(async move {
			loop {
				sweep_interval.tick().await;
				match cache.cleanup_expired().await {
					Ok(count) if count > 0 => {
						tracing::debug!("Cache sweep removed {} expired entries", count);
					},
					Err(e) => {
						tracing::warn!("Cache sweep failed: {}", e);
					},
					_ => {}, // Nothing expired
				}
			}
		});

		tokio::signal::ctrl_c()
			.await
			.map_err(|e| PipelineError::Service(e.to_string()))?;
		tracing::info!("Shutdown signal received");

		shutdown_tx.send(true).ok();
		match worker_handle.await {
			Ok(result) => result.map_err(|e| PipelineError::Service(e.to_string()))?,
			Err(e) => tracing::error!("Settlement worker task failed: {}", e),
		}
		sweep_handle.abort();

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use flow_cache::implementations::memory::create_cache;
	use flow_events::implementations::memory::create_event_log;
	use flow_store::implementations::memory::create_store;
	use flow_types::{OrderRequest, OrderStatus};
	use rust_decimal_macros::dec;
	use std::time::Duration;

	fn factories() -> PipelineFactories {
		let mut store_factories: HashMap<String, StoreFactory> = HashMap::new();
		store_factories.insert("memory".to_string(), create_store);

		let mut cache_factories: HashMap<String, CacheFactory> = HashMap::new();
		cache_factories.insert("memory".to_string(), create_cache);

		let mut event_log_factories: HashMap<String, EventLogFactory> = HashMap::new();
		event_log_factories.insert("memory".to_string(), create_event_log);

		PipelineFactories {
			store_factories,
			cache_factories,
			event_log_factories,
		}
	}

	fn test_config() -> Config {
		r#"
[pipeline]
id = "tradeflow-test"

[store]
primary = "memory"
[store.implementations.memory]

[cache]
primary = "memory"
[cache.implementations.memory]

[events]
primary = "memory"
[events.implementations.memory]

[settlement]
settle_delay_ms = 20
"#
		.parse()
		.expect("test config must parse")
	}

	fn request(user_id: i64, item: &str, amount: rust_decimal::Decimal) -> OrderRequest {
		OrderRequest {
			user_id,
			item: item.to_string(),
			amount,
		}
	}

	/// Spawns the settlement worker the way `run` does, without the ctrl-c
	/// wait.
	fn spawn_worker(
		pipeline: &Pipeline,
	) -> (
		watch::Sender<bool>,
		tokio::task::JoinHandle<Result<(), flow_settlement::SettlementError>>,
	) {
		let worker = pipeline.settlement_worker();
		let (shutdown_tx, shutdown_rx) = watch::channel(false);
		let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });
		(shutdown_tx, handle)
	}

	#[tokio::test]
	async fn build_wires_the_configured_backends() {
		let pipeline = PipelineBuilder::new(test_config()).build(factories()).unwrap();
		assert_eq!(pipeline.config().pipeline.id, "tradeflow-test");
	}

	#[tokio::test]
	async fn build_rejects_unregistered_implementations() {
		let pipeline = PipelineBuilder::new(test_config()).build(PipelineFactories {
			store_factories: HashMap::new(),
			cache_factories: HashMap::new(),
			event_log_factories: HashMap::new(),
		});
		let err = pipeline.err().expect("build must fail without factories");
		assert!(err.to_string().contains("store"));
	}

	#[tokio::test]
	async fn submitted_order_settles_after_the_delay() {
		let pipeline = PipelineBuilder::new(test_config()).build(factories()).unwrap();
		let (shutdown, handle) = spawn_worker(&pipeline);

		let order = pipeline
			.orders()
			.submit_order(request(7, "Widget", dec!(9.99)))
			.await
			.unwrap();
		assert_eq!(order.status, OrderStatus::Open);

		let mut settled = None;
		for _ in 0..300 {
			let current = pipeline.orders().get_order(order.id).await.unwrap();
			if current.status == OrderStatus::Filled {
				settled = Some(current);
				break;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		let settled = settled.expect("order should settle");
		assert_eq!(settled.id, order.id);

		shutdown.send(true).unwrap();
		handle.await.unwrap().unwrap();
	}

	#[tokio::test]
	async fn query_before_settlement_sees_the_open_order() {
		let pipeline = PipelineBuilder::new(test_config()).build(factories()).unwrap();
		// No worker running: the order must stay OPEN.

		let order = pipeline
			.orders()
			.submit_order(request(3, "Widget", dec!(1.00)))
			.await
			.unwrap();

		let orders = pipeline.orders().get_user_orders(3).await.unwrap();
		assert_eq!(orders.len(), 1);
		assert_eq!(orders[0].id, order.id);
		assert_eq!(orders[0].status, OrderStatus::Open);
	}

	#[tokio::test]
	async fn concurrent_submissions_get_distinct_ids_and_a_fresh_snapshot() {
		let pipeline = PipelineBuilder::new(test_config()).build(factories()).unwrap();
		let orders = pipeline.orders();

		let (first, second) = tokio::join!(
			orders.submit_order(request(5, "Widget", dec!(1.00))),
			orders.submit_order(request(5, "Gadget", dec!(2.00))),
		);
		let first = first.unwrap();
		let second = second.unwrap();
		assert_ne!(first.id, second.id);

		let snapshot = orders.get_user_orders(5).await.unwrap();
		let mut ids: Vec<i64> = snapshot.iter().map(|o| o.id).collect();
		ids.sort_unstable();
		let mut expected = vec![first.id, second.id];
		expected.sort_unstable();
		assert_eq!(ids, expected);
	}

	#[tokio::test]
	async fn settled_order_drops_out_of_the_open_snapshot() {
		let pipeline = PipelineBuilder::new(test_config()).build(factories()).unwrap();
		let (shutdown, handle) = spawn_worker(&pipeline);

		let order = pipeline
			.orders()
			.submit_order(request(9, "Widget", dec!(1.00)))
			.await
			.unwrap();

		for _ in 0..300 {
			let current = pipeline.orders().get_order(order.id).await.unwrap();
			if current.status == OrderStatus::Filled {
				break;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}

		// Settlement invalidated the snapshot, so the next read recomputes.
		let open = pipeline.orders().get_user_orders(9).await.unwrap();
		assert!(open.is_empty());

		shutdown.send(true).unwrap();
		handle.await.unwrap().unwrap();
	}
}
