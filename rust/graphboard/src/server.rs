use crate::{
    chart::{self, series},
    config::AppConfig,
    error::{Result, ServiceError},
    models::{
        ChartResponse, GraphConfig, GraphListResponse, GraphPayload, GraphResponse,
        ParametersRequest, ParametersResponse, QueryRequest, QueryResponse,
    },
    params,
    state::AppState,
    storage::{self, GraphStore},
    warehouse,
};
use anyhow::Context;
use axum::{
    extract::{FromRequest, Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::{collections::HashMap, sync::Arc};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

const MISSING_FIELDS: &str = "Missing required fields: name, query, chartType, chartConfig";
const GRAPH_NOT_FOUND: &str = "Graph not found";

/// JSON body extractor whose rejections use the service error body.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ServiceError))]
struct JsonBody<T>(T);

pub struct Server {
    config: Arc<AppConfig>,
    state: AppState,
}

impl Server {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let store = GraphStore::open(&config.data_dir).with_context(|| {
            format!("failed to open graph store at {}", config.data_dir.display())
        })?;
        let warehouse = warehouse::from_config(&config)?;
        let config = Arc::new(config);
        let state = AppState::new(Arc::clone(&config), store, warehouse);

        Ok(Self { config, state })
    }

    /// Builds a server around an existing state, e.g. with a stub warehouse.
    pub fn with_state(state: AppState) -> Self {
        Self {
            config: Arc::clone(&state.config),
            state,
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/healthz", get(Self::health))
            .route("/api/graphs", get(Self::list_graphs).post(Self::create_graph))
            .route(
                "/api/graphs/:id",
                get(Self::get_graph)
                    .put(Self::update_graph)
                    .delete(Self::delete_graph),
            )
            .route("/api/graphs/:id/chart", get(Self::graph_chart))
            .route("/api/query", post(Self::query))
            .route("/api/parameters", post(Self::parameters))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.config.listen_addr;
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, data_dir = %self.config.data_dir.display(), "graphboard listening");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    async fn health() -> Json<serde_json::Value> {
        Json(json!({ "status": "ok" }))
    }

    async fn list_graphs(State(state): State<AppState>) -> Result<Json<GraphListResponse>> {
        let graphs = with_store(&state.store, |store| store.list()).await?;
        Ok(Json(GraphListResponse {
            success: true,
            graphs,
        }))
    }

    async fn create_graph(
        State(state): State<AppState>,
        JsonBody(payload): JsonBody<GraphPayload>,
    ) -> Result<Json<GraphResponse>> {
        let GraphPayload {
            name,
            query,
            location,
            chart_type,
            chart_config,
            parameters,
        } = payload;

        let (Some(name), Some(query), Some(chart_type), Some(chart_config)) = (
            name.filter(|name| !name.is_empty()),
            query.filter(|query| !query.is_empty()),
            chart_type,
            chart_config,
        ) else {
            return Err(ServiceError::InvalidRequest(MISSING_FIELDS.to_string()));
        };

        let graph = GraphConfig {
            id: storage::generate_id(),
            name,
            query,
            location: location
                .filter(|location| !location.is_empty())
                .unwrap_or_else(|| state.config.default_location.clone()),
            chart_type,
            chart_config,
            parameters,
        };

        let saved = graph.clone();
        with_store(&state.store, move |store| store.save(&saved)).await?;
        info!(id = %graph.id, name = %graph.name, "graph created");

        Ok(Json(GraphResponse {
            success: true,
            graph,
        }))
    }

    async fn get_graph(
        State(state): State<AppState>,
        Path(id): Path<String>,
    ) -> Result<Json<GraphResponse>> {
        let graph = load_graph(&state.store, id).await?;
        Ok(Json(GraphResponse {
            success: true,
            graph,
        }))
    }

    async fn update_graph(
        State(state): State<AppState>,
        Path(id): Path<String>,
        JsonBody(payload): JsonBody<GraphPayload>,
    ) -> Result<Json<GraphResponse>> {
        let existing = load_graph(&state.store, id).await?;
        let graph = payload.merge_into(existing);

        let saved = graph.clone();
        with_store(&state.store, move |store| store.save(&saved)).await?;
        info!(id = %graph.id, "graph updated");

        Ok(Json(GraphResponse {
            success: true,
            graph,
        }))
    }

    async fn delete_graph(
        State(state): State<AppState>,
        Path(id): Path<String>,
    ) -> Result<Json<serde_json::Value>> {
        let target = id.clone();
        let removed = with_store(&state.store, move |store| store.delete(&target)).await?;
        if !removed {
            return Err(ServiceError::NotFound(GRAPH_NOT_FOUND.to_string()));
        }

        info!(%id, "graph deleted");
        Ok(Json(json!({ "success": true })))
    }

    async fn query(
        State(state): State<AppState>,
        JsonBody(request): JsonBody<QueryRequest>,
    ) -> Result<Json<QueryResponse>> {
        if request.query.trim().is_empty() {
            return Err(ServiceError::InvalidRequest("Query is required".to_string()));
        }

        let sql = params::substitute_parameters(
            &request.query,
            &request.parameters,
            &request.parameter_types,
        );
        let location = resolve_location(&state, request.location.as_deref());
        debug!(%location, "executing ad-hoc query");

        let rows = state.warehouse.run_query(&sql, &location).await?;
        let columns = chart::available_columns(&rows);

        Ok(Json(QueryResponse {
            success: true,
            row_count: rows.len(),
            rows,
            columns,
        }))
    }

    async fn parameters(
        JsonBody(request): JsonBody<ParametersRequest>,
    ) -> Result<Json<ParametersResponse>> {
        Ok(Json(ParametersResponse {
            success: true,
            parameters: params::sync_definitions(&request.query, &request.parameters),
        }))
    }

    async fn graph_chart(
        State(state): State<AppState>,
        Path(id): Path<String>,
        Query(overrides): Query<HashMap<String, String>>,
    ) -> Result<Json<ChartResponse>> {
        let graph = load_graph(&state.store, id).await?;

        let (values, types) = params::values_and_types(graph.parameters(), &overrides);
        let sql = params::substitute_parameters(&graph.query, &values, &types);
        let location = resolve_location(&state, Some(&graph.location));

        let rows = state.warehouse.run_query(&sql, &location).await?;
        let columns = chart::available_columns(&rows);

        let config = &graph.chart_config;
        if !rows.is_empty() {
            chart::validate_config(&columns, &config.x_axis, &config.y_axis, config.group_by())?;
        }

        let data = chart::transform(&rows, &config.transform_options());
        let series = series::build_series(graph.chart_type, &data, config);
        debug!(id = %graph.id, rows = rows.len(), points = data.len(), "chart data built");

        Ok(Json(ChartResponse {
            success: true,
            row_count: rows.len(),
            columns,
            data,
            series,
            graph,
        }))
    }
}

fn resolve_location(state: &AppState, requested: Option<&str>) -> String {
    requested
        .filter(|location| !location.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| state.config.default_location.clone())
}

async fn load_graph(store: &GraphStore, id: String) -> Result<GraphConfig> {
    with_store(store, move |store| store.get(&id))
        .await?
        .ok_or_else(|| ServiceError::NotFound(GRAPH_NOT_FOUND.to_string()))
}

async fn with_store<T, F>(store: &GraphStore, op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&GraphStore) -> storage::Result<T> + Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || op(&store))
        .await
        .map_err(|err| ServiceError::Internal(anyhow::anyhow!("storage task failed: {err}")))?
        .map_err(ServiceError::from)
}
