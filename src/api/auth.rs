use chrono::Utc;
use rocket::{http::CookieJar, serde::json::Json, Route, State};

use crate::{
    engine::{
        identity::{self, Identity},
        linker::{self, IssuedSecret},
        otp::{self, CodeIssue},
    },
    error::{Error, Result},
    logging::RequestId,
    model::{
        api::{
            admin::AccountDescription,
            auth::{
                AuthToken, CodeRequestBody, ExchangeRequest, StaffCredentials, VerifyRequest,
                AUTH_TOKEN_COOKIE,
            },
            structure::VoterDescription,
        },
        common::Email,
    },
    notifier::SharedNotifier,
    store::Db,
    Config,
};

pub fn routes() -> Vec<Route> {
    routes![
        resolve_identity,
        request_code,
        verify_code,
        exchange_credential,
        staff_sign_in,
        logout
    ]
}

#[get("/auth/identity?<email>")]
pub async fn resolve_identity(email: Email, store: &State<Db>) -> Result<Json<Identity>> {
    Ok(Json(identity::resolve(&***store, &email).await?))
}

#[post("/auth/voter/code", data = "<request>", format = "json")]
pub async fn request_code(
    request: Json<CodeRequestBody>,
    request_id: &RequestId,
    store: &State<Db>,
    notifier: &State<SharedNotifier>,
    config: &State<Config>,
) -> Result<Json<CodeIssue>> {
    info!("req{request_id}: login code requested for {}", request.email);
    let issue = otp::request_code(
        &***store,
        &***notifier,
        config.otp_policy(),
        &request.email,
        Utc::now(),
    )
    .await?;
    Ok(Json(issue))
}

#[post("/auth/voter/verify", data = "<request>", format = "json")]
pub async fn verify_code(
    request: Json<VerifyRequest>,
    request_id: &RequestId,
    store: &State<Db>,
    config: &State<Config>,
) -> Result<Json<IssuedSecret>> {
    let verified = otp::verify_code(
        &***store,
        config.hmac_secret(),
        &request.email,
        &request.code,
        Utc::now(),
    )
    .await?;
    info!(
        "req{request_id}: voter {} verified for instance {}",
        verified.voter.id, verified.instance.id
    );
    Ok(Json(verified.credential))
}

#[post("/auth/voter/session", data = "<request>", format = "json")]
pub async fn exchange_credential(
    request: Json<ExchangeRequest>,
    cookies: &CookieJar<'_>,
    store: &State<Db>,
    config: &State<Config>,
) -> Result<Json<VoterDescription>> {
    let voter = linker::exchange(
        &***store,
        config.hmac_secret(),
        &request.email,
        &request.secret,
    )
    .await?;

    let token = AuthToken::new(&voter);
    cookies.add(token.into_cookie(config));

    Ok(Json(voter.into()))
}

#[post("/auth/staff", data = "<credentials>", format = "json")]
pub async fn staff_sign_in(
    credentials: Json<StaffCredentials>,
    cookies: &CookieJar<'_>,
    store: &State<Db>,
    config: &State<Config>,
) -> Result<Json<AccountDescription>> {
    let account = store
        .account_by_email(&credentials.email)
        .await?
        .filter(|account| account.verify_password(&credentials.password))
        .ok_or_else(|| {
            Error::Unauthorized(
                "No account found with the provided email and password combination".to_string(),
            )
        })?;

    let token = AuthToken::new(&account);
    cookies.add(token.into_cookie(config));

    Ok(Json(account.into()))
}

#[delete("/auth")]
pub fn logout(cookies: &CookieJar<'_>) {
    cookies.remove(AUTH_TOKEN_COOKIE);
}
