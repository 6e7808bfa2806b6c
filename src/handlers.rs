use crate::errors::AppError;
use crate::models::{parse_non_negative, CounterResponse, CounterView, ResetRequest, UpdateRequest};
use crate::state::AppState;
use crate::ui::render_index;
use axum::{extract::State, response::Html, Json};
use chrono::Utc;
use tracing::{info, warn};

const WRONG_PASSWORD: &str = "Contraseña incorrecta";
const INVALID_DAYS: &str = "Por favor, ingrese un número válido de días";

pub async fn index(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let rollover = state.store.ensure_daily_increment(None).await?;
    Ok(Html(render_index(&CounterView::from(&rollover.record))))
}

pub async fn get_counter(State(state): State<AppState>) -> Result<Json<CounterResponse>, AppError> {
    let rollover = state.store.ensure_daily_increment(None).await?;

    Ok(Json(CounterResponse {
        success: true,
        message: None,
        data: CounterView::from(&rollover.record),
    }))
}

pub async fn update_counter(
    State(state): State<AppState>,
    Json(payload): Json<UpdateRequest>,
) -> Result<Json<CounterResponse>, AppError> {
    require_password(&state, payload.password.as_deref())?;

    let dias = payload
        .dias
        .as_ref()
        .and_then(parse_non_negative)
        .ok_or_else(|| AppError::bad_request(INVALID_DAYS))?;
    // An unusable previous-record value leaves the stored one in place.
    let record_anterior = payload.record_anterior.as_ref().and_then(parse_non_negative);

    let change = state
        .store
        .apply_update(dias, record_anterior, Utc::now())
        .await?;
    info!(from = change.previous, to = dias, "counter updated from admin panel");

    Ok(Json(CounterResponse {
        success: true,
        message: Some(format!("Días actualizados de {} a {}", change.previous, dias)),
        data: CounterView::from(&change.record),
    }))
}

pub async fn reset_counter(
    State(state): State<AppState>,
    Json(payload): Json<ResetRequest>,
) -> Result<Json<CounterResponse>, AppError> {
    require_password(&state, payload.password.as_deref())?;

    let change = state.store.apply_reset(Utc::now()).await?;
    info!(from = change.previous, "counter reset from admin panel");

    Ok(Json(CounterResponse {
        success: true,
        message: Some(format!("Contador reiniciado desde {} días", change.previous)),
        data: CounterView::from(&change.record),
    }))
}

fn require_password(state: &AppState, password: Option<&str>) -> Result<(), AppError> {
    match password {
        Some(password) if password == &*state.admin_password => Ok(()),
        _ => {
            warn!("rejected admin request with wrong password");
            Err(AppError::unauthorized(WRONG_PASSWORD))
        }
    }
}
