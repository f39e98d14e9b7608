use axum::{
    extract::{Path, State},
    Json,
};
use moksha_core::{
    keyset::{CurrencyUnit, PaymentMethod, V1Keyset, V1KeysetInfo, V1Keysets},
    primitives::{
        KeyResponse, KeysResponse, MintInfoResponse, NutMethodUnit, NutPaymentMethodInfo,
        NutSupported, Nuts, PostCheckStateRequest, PostCheckStateResponse, PostMeltBolt11Request,
        PostMeltBolt11Response, PostMeltQuoteBolt11Request, PostMeltQuoteBolt11Response,
        PostMintBolt11Request, PostMintBolt11Response, PostMintQuoteBolt11Request,
        PostMintQuoteBolt11Response, PostRestoreRequest, PostRestoreResponse, PostSwapRequest,
        PostSwapResponse,
    },
};
use std::str::FromStr;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{error::MokshaMintError, mint::Mint};

fn parse_quote_id(quote_id: &str) -> Result<Uuid, MokshaMintError> {
    Uuid::from_str(quote_id).map_err(|_| MokshaMintError::QuoteUnknown(quote_id.to_owned()))
}

#[utoipa::path(
        post,
        path = "/v1/swap",
        request_body = PostSwapRequest,
        responses(
            (status = 200, description = "post swap", body = [PostSwapResponse])
        ),
    )]
#[instrument(name = "post_swap", skip(mint), err)]
pub async fn post_swap(
    State(mint): State<Mint>,
    Json(swap_request): Json<PostSwapRequest>,
) -> Result<Json<PostSwapResponse>, MokshaMintError> {
    let signatures = mint
        .swap(&swap_request.inputs, &swap_request.outputs)
        .await?;
    Ok(Json(PostSwapResponse { signatures }))
}

#[utoipa::path(
        get,
        path = "/v1/keys",
        responses(
            (status = 200, description = "get keys of all active keysets", body = [KeysResponse])
        )
    )]
#[instrument(skip(mint), err)]
pub async fn get_keys(State(mint): State<Mint>) -> Result<Json<KeyResponse>, MokshaMintError> {
    let keysets = mint
        .keysets()
        .await
        .iter()
        .filter(|k| k.active)
        .map(V1Keyset::from)
        .collect();
    Ok(Json(KeysResponse { keysets }))
}

#[utoipa::path(
        get,
        path = "/v1/keys/{id}",
        responses(
            (status = 200, description = "get keys by id", body = [KeysResponse])
        ),
        params(
            ("id" = String, Path, description = "keyset id"),
        )
    )]
#[instrument(skip(mint), err)]
pub async fn get_keys_by_id(
    Path(id): Path<String>,
    State(mint): State<Mint>,
) -> Result<Json<KeyResponse>, MokshaMintError> {
    let keyset = mint.keyset_by_id(&id).await?;
    Ok(Json(KeysResponse {
        keysets: vec![V1Keyset::from(&keyset)],
    }))
}

#[utoipa::path(
        get,
        path = "/v1/keysets",
        responses(
            (status = 200, description = "get all keyset ids and their state", body = [V1Keysets])
        ),
    )]
#[instrument(skip(mint), err)]
pub async fn get_keysets(State(mint): State<Mint>) -> Result<Json<V1Keysets>, MokshaMintError> {
    Ok(Json(V1Keysets {
        keysets: mint
            .keysets()
            .await
            .iter()
            .map(V1KeysetInfo::from)
            .collect(),
    }))
}

#[utoipa::path(
        post,
        path = "/v1/mint/quote/bolt11",
        request_body = PostMintQuoteBolt11Request,
        responses(
            (status = 200, description = "post mint quote", body = [PostMintQuoteBolt11Response])
        ),
    )]
#[instrument(name = "post_mint_quote_bolt11", skip(mint), err)]
pub async fn post_mint_quote_bolt11(
    State(mint): State<Mint>,
    Json(request): Json<PostMintQuoteBolt11Request>,
) -> Result<Json<PostMintQuoteBolt11Response>, MokshaMintError> {
    let quote = mint.mint_quote_bolt11(request.unit, request.amount).await?;
    Ok(Json((&quote).into()))
}

#[utoipa::path(
        get,
        path = "/v1/mint/quote/bolt11/{quote_id}",
        responses(
            (status = 200, description = "get mint quote by id", body = [PostMintQuoteBolt11Response])
        ),
        params(
            ("quote_id" = String, Path, description = "quote id"),
        )
    )]
#[instrument(name = "get_mint_quote_bolt11", skip(mint), err)]
pub async fn get_mint_quote_bolt11(
    Path(quote_id): Path<String>,
    State(mint): State<Mint>,
) -> Result<Json<PostMintQuoteBolt11Response>, MokshaMintError> {
    debug!("get_mint_quote: {}", quote_id);
    let quote = mint.mint_quote_state(parse_quote_id(&quote_id)?).await?;
    Ok(Json((&quote).into()))
}

#[utoipa::path(
        post,
        path = "/v1/mint/bolt11",
        request_body = PostMintBolt11Request,
        responses(
            (status = 200, description = "post mint", body = [PostMintBolt11Response])
        ),
    )]
#[instrument(name = "post_mint_bolt11", skip(mint), err)]
pub async fn post_mint_bolt11(
    State(mint): State<Mint>,
    Json(request): Json<PostMintBolt11Request>,
) -> Result<Json<PostMintBolt11Response>, MokshaMintError> {
    let signatures = mint.mint_bolt11(request.quote, &request.outputs).await?;
    Ok(Json(PostMintBolt11Response { signatures }))
}

#[utoipa::path(
        post,
        path = "/v1/melt/quote/bolt11",
        request_body = PostMeltQuoteBolt11Request,
        responses(
            (status = 200, description = "post melt quote", body = [PostMeltQuoteBolt11Response])
        ),
    )]
#[instrument(name = "post_melt_quote_bolt11", skip(mint), err)]
pub async fn post_melt_quote_bolt11(
    State(mint): State<Mint>,
    Json(request): Json<PostMeltQuoteBolt11Request>,
) -> Result<Json<PostMeltQuoteBolt11Response>, MokshaMintError> {
    let quote = mint
        .melt_quote_bolt11(request.unit, request.request)
        .await?;
    Ok(Json((&quote).into()))
}

#[utoipa::path(
        get,
        path = "/v1/melt/quote/bolt11/{quote_id}",
        responses(
            (status = 200, description = "get melt quote by id", body = [PostMeltQuoteBolt11Response])
        ),
        params(
            ("quote_id" = String, Path, description = "quote id"),
        )
    )]
#[instrument(name = "get_melt_quote_bolt11", skip(mint), err)]
pub async fn get_melt_quote_bolt11(
    Path(quote_id): Path<String>,
    State(mint): State<Mint>,
) -> Result<Json<PostMeltQuoteBolt11Response>, MokshaMintError> {
    debug!("get_melt_quote: {}", quote_id);
    let quote = mint
        .db
        .get_melt_quote_by_id(parse_quote_id(&quote_id)?)
        .await?;
    Ok(Json((&quote).into()))
}

#[utoipa::path(
        post,
        path = "/v1/melt/bolt11",
        request_body = PostMeltBolt11Request,
        responses(
            (status = 200, description = "post melt", body = [PostMeltBolt11Response])
        ),
    )]
#[instrument(name = "post_melt_bolt11", skip(mint), err)]
pub async fn post_melt_bolt11(
    State(mint): State<Mint>,
    Json(request): Json<PostMeltBolt11Request>,
) -> Result<Json<PostMeltBolt11Response>, MokshaMintError> {
    let quote = mint
        .melt_bolt11(request.quote, &request.inputs, request.outputs.as_deref())
        .await?;
    Ok(Json((&quote).into()))
}

#[utoipa::path(
        post,
        path = "/v1/checkstate",
        request_body = PostCheckStateRequest,
        responses(
            (status = 200, description = "check proof state", body = [PostCheckStateResponse])
        ),
    )]
#[instrument(name = "post_check_state", skip(mint), err)]
pub async fn post_check_state(
    State(mint): State<Mint>,
    Json(request): Json<PostCheckStateRequest>,
) -> Result<Json<PostCheckStateResponse>, MokshaMintError> {
    let states = mint.check_state(request.ys).await?;
    Ok(Json(PostCheckStateResponse { states }))
}

#[utoipa::path(
        post,
        path = "/v1/restore",
        request_body = PostRestoreRequest,
        responses(
            (status = 200, description = "restore signatures for known outputs", body = [PostRestoreResponse])
        ),
    )]
#[instrument(name = "post_restore", skip(mint), err)]
pub async fn post_restore(
    State(mint): State<Mint>,
    Json(request): Json<PostRestoreRequest>,
) -> Result<Json<PostRestoreResponse>, MokshaMintError> {
    let (outputs, signatures) = mint.restore(&request.outputs).await?;
    Ok(Json(PostRestoreResponse { outputs, signatures }))
}

#[utoipa::path(
        get,
        path = "/v1/info",
        responses(
            (status = 200, description = "get mint info", body = [MintInfoResponse])
        )
    )]
#[instrument(skip(mint), err)]
pub async fn get_info(
    State(mint): State<Mint>,
) -> Result<Json<MintInfoResponse>, MokshaMintError> {
    let keyset = mint.active_keyset(CurrencyUnit::Sat).await?;

    let mint_info = MintInfoResponse {
        name: mint.config.info.name.clone(),
        pubkey: keyset.mint_pubkey,
        version: mint
            .config
            .info
            .version
            .then(|| mint.config.build.full_version()),
        description: mint.config.info.description.clone(),
        description_long: mint.config.info.description_long.clone(),
        contact: mint.config.info.contact.clone(),
        motd: mint.config.info.motd.clone(),
        nuts: Nuts {
            nut4: NutPaymentMethodInfo {
                methods: vec![NutMethodUnit {
                    method: PaymentMethod::Bolt11,
                    unit: CurrencyUnit::Sat,
                }],
                disabled: false,
            },
            nut5: NutPaymentMethodInfo {
                methods: vec![NutMethodUnit {
                    method: PaymentMethod::Bolt11,
                    unit: CurrencyUnit::Sat,
                }],
                disabled: false,
            },
            nut7: NutSupported { supported: true },
            nut8: NutSupported { supported: true },
            nut9: NutSupported { supported: true },
            nut10: NutSupported { supported: true },
            nut11: NutSupported { supported: true },
            nut12: NutSupported { supported: true },
        },
    };
    Ok(Json(mint_info))
}
