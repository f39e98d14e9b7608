use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::routing::{get, get_service, post};
use axum::{middleware, Router};
use tower_http::services::ServeDir;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::prelude::__tracing_subscriber_SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use moksha_core::blind::{BlindedMessage, BlindedSignature};
use moksha_core::keyset::{CurrencyUnit, PaymentMethod, V1Keyset, V1KeysetInfo, V1Keysets};
use moksha_core::primitives::{
    KeyResponse, KeysResponse, MintInfoResponse, NutMethodUnit, NutPaymentMethodInfo, NutSupported,
    Nuts, PostCheckStateRequest, PostCheckStateResponse, PostMeltBolt11Request,
    PostMeltBolt11Response, PostMeltQuoteBolt11Request, PostMeltQuoteBolt11Response,
    PostMintBolt11Request, PostMintBolt11Response, PostMintQuoteBolt11Request,
    PostMintQuoteBolt11Response, PostRestoreRequest, PostRestoreResponse, PostSwapRequest,
    PostSwapResponse, ProofState, ProofStateEntry,
};
use moksha_core::proof::{Proof, Proofs};
use moksha_core::secret::Witness;

use crate::mint::Mint;
use crate::routes::default::{
    get_info, get_keys, get_keys_by_id, get_keysets, get_melt_quote_bolt11, get_mint_quote_bolt11,
    post_check_state, post_melt_bolt11, post_melt_quote_bolt11, post_mint_bolt11,
    post_mint_quote_bolt11, post_restore, post_swap,
};

pub async fn run_server(mint: Mint) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    if let Some(ref build_time) = mint.config.build.build_time {
        info!("build time: {}", build_time);
    }
    if let Some(ref commit_hash) = mint.config.build.commit_hash {
        info!("git commit-hash: {}", commit_hash);
    }
    if let Some(ref serve_wallet_path) = mint.config.server.serve_wallet_path {
        info!("serving wallet from path: {:?}", serve_wallet_path);
    }
    info!("listening on: {}", &mint.config.server.host_port);
    info!("mint-info: {:?}", mint.config.info);
    info!("lightning fee-reserve: {:?}", mint.config.lightning_fee);
    info!("lightning-backend: {}", mint.lightning_type);

    let listener = tokio::net::TcpListener::bind(&mint.config.server.host_port).await?;

    axum::serve(
        listener,
        app(mint)
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_headers(Any)
                    .allow_methods(Any)
                    .expose_headers(Any),
            )
            .into_make_service(),
    )
    .await?;

    Ok(())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::default::get_keys,
        crate::routes::default::get_keys_by_id,
        crate::routes::default::get_keysets,
        crate::routes::default::post_mint_bolt11,
        crate::routes::default::post_mint_quote_bolt11,
        crate::routes::default::get_mint_quote_bolt11,
        crate::routes::default::post_melt_bolt11,
        crate::routes::default::post_melt_quote_bolt11,
        crate::routes::default::get_melt_quote_bolt11,
        crate::routes::default::post_swap,
        crate::routes::default::post_check_state,
        crate::routes::default::post_restore,
        crate::routes::default::get_info,
        get_health,
    ),
    components(schemas(
        MintInfoResponse,
        Nuts,
        NutPaymentMethodInfo,
        NutMethodUnit,
        NutSupported,
        CurrencyUnit,
        PaymentMethod,
        KeysResponse,
        KeyResponse,
        V1Keysets,
        V1Keyset,
        V1KeysetInfo,
        BlindedMessage,
        BlindedSignature,
        Proof,
        Proofs,
        Witness,
        ProofState,
        ProofStateEntry,
        PostMintQuoteBolt11Request,
        PostMintQuoteBolt11Response,
        PostMeltQuoteBolt11Request,
        PostMeltQuoteBolt11Response,
        PostMeltBolt11Request,
        PostMeltBolt11Response,
        PostMintBolt11Request,
        PostMintBolt11Response,
        PostSwapRequest,
        PostSwapResponse,
        PostCheckStateRequest,
        PostCheckStateResponse,
        PostRestoreRequest,
        PostRestoreResponse,
    ))
)]
struct ApiDoc;

fn app(mint: Mint) -> Router {
    let v1_routes = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/v1/keys", get(get_keys))
        .route("/v1/keys/:id", get(get_keys_by_id))
        .route("/v1/keysets", get(get_keysets))
        .route("/v1/mint/quote/bolt11", post(post_mint_quote_bolt11))
        .route("/v1/mint/quote/bolt11/:quote_id", get(get_mint_quote_bolt11))
        .route("/v1/mint/bolt11", post(post_mint_bolt11))
        .route("/v1/melt/quote/bolt11", post(post_melt_quote_bolt11))
        .route("/v1/melt/quote/bolt11/:quote_id", get(get_melt_quote_bolt11))
        .route("/v1/melt/bolt11", post(post_melt_bolt11))
        .route("/v1/swap", post(post_swap))
        .route("/v1/checkstate", post(post_check_state))
        .route("/v1/restore", post(post_restore))
        .route("/v1/info", get(get_info));

    let general_routes = Router::new().route("/health", get(get_health));

    let server_config = mint.config.server.clone();
    let prefix = server_config.api_prefix.clone().unwrap_or_default();

    let router = Router::new()
        .nest(&prefix, v1_routes)
        .nest("", general_routes)
        .with_state(mint)
        .layer(TraceLayer::new_for_http());

    if let Some(ref serve_wallet_path) = server_config.serve_wallet_path {
        return router.nest_service(
            "/",
            get_service(ServeDir::new(serve_wallet_path))
                .layer(middleware::from_fn(add_response_headers)),
        );
    }
    router
}

/// Sets the cross-origin isolation headers Flutter-web wallets need to use `SharedArrayBuffer`.
async fn add_response_headers(
    req: Request,
    next: Next,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut res = next.run(req).await;

    res.headers_mut().insert(
        HeaderName::from_static("cross-origin-embedder-policy"),
        HeaderValue::from_static("require-corp"),
    );
    res.headers_mut().insert(
        HeaderName::from_static("cross-origin-opener-policy"),
        HeaderValue::from_static("same-origin"),
    );
    Ok(res)
}

#[utoipa::path(
        get,
        path = "/health",
        responses(
            (status = 200, description = "health check")
        ),
    )]
async fn get_health() -> impl IntoResponse {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use moksha_core::keyset::{CurrencyUnit, V1Keysets};
    use moksha_core::primitives::KeysResponse;
    use tower::ServiceExt;

    use crate::{
        config::MintConfig,
        database::MockDatabase,
        lightning::{LightningType, MockLightning},
        mint::Mint,
        server::app,
    };

    async fn create_mock_mint() -> Mint {
        let mut db = MockDatabase::new();
        db.expect_list_keysets().returning(|| Ok(vec![]));
        db.expect_store_keyset().returning(|_| Ok(()));

        Mint::new(
            Arc::new(MockLightning::new()),
            LightningType::Lnbits(Default::default()),
            db,
            MintConfig {
                privatekey: "mytestsecret".to_string(),
                derivation_path: Some("0/0/0/0".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("failed to build test mint")
    }

    #[tokio::test]
    async fn test_get_v1_keys() -> anyhow::Result<()> {
        let app = app(create_mock_mint().await);
        let response = app
            .oneshot(Request::builder().uri("/v1/keys").body(Body::empty())?)
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await?.to_bytes();
        let keys: KeysResponse = serde_json::from_slice(&body)?;
        assert_eq!(1, keys.keysets.len());
        assert_eq!(64, keys.keysets[0].keys.len());
        assert_eq!(CurrencyUnit::Sat, keys.keysets[0].unit);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_v1_keysets() -> anyhow::Result<()> {
        let app = app(create_mock_mint().await);
        let response = app
            .oneshot(Request::builder().uri("/v1/keysets").body(Body::empty())?)
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await?.to_bytes();
        let keysets: V1Keysets = serde_json::from_slice(&body)?;
        assert_eq!(1, keysets.keysets.len());
        assert!(keysets.keysets[0].active);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_health() -> anyhow::Result<()> {
        let app = app(create_mock_mint().await);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty())?)
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_v1_keys_by_unknown_id_is_bad_request() -> anyhow::Result<()> {
        let app = app(create_mock_mint().await);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/keys/unknownkeyset")
                    .body(Body::empty())?,
            )
            .await?;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
