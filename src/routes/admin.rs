use actix_web::{web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{admin_validator, AuthUser},
    db,
    models::Role,
    queue::QueueError,
    routes::{optional, write_failed},
    state::AppState,
};

const MIN_PASSWORD_LEN: usize = 6;
const MAX_SERVICE_MINUTES: u32 = 24 * 60;

#[derive(Deserialize)]
struct ServiceCreateForm {
    name: String,
    duration_minutes: Option<u32>,
    price: Option<f64>,
}

#[derive(Deserialize)]
struct BranchCreateForm {
    code: String,
    name: String,
    address: Option<String>,
    phone: Option<String>,
}

#[derive(Deserialize)]
struct BarberCreateForm {
    name: String,
    branch: Option<String>,
}

#[derive(Deserialize)]
struct UserCreateForm {
    username: String,
    display_name: String,
    password: String,
    role: String,
    branch: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .wrap(HttpAuthentication::basic(admin_validator))
            .service(web::resource("/services").route(web::post().to(create_service)))
            .service(web::resource("/services/{id}/toggle").route(web::post().to(toggle_service)))
            .service(web::resource("/branches").route(web::post().to(create_branch)))
            .service(web::resource("/barbers").route(web::post().to(create_barber)))
            .service(web::resource("/barbers/{id}").route(web::delete().to(delete_barber)))
            .service(web::resource("/barbers/{id}/toggle").route(web::post().to(toggle_barber)))
            .service(web::resource("/users").route(web::post().to(create_user)))
            .service(web::resource("/customers/{id}").route(web::delete().to(delete_customer))),
    );
}

fn require_master(auth: &AuthUser) -> Result<(), QueueError> {
    if auth.scope.is_master() {
        Ok(())
    } else {
        Err(QueueError::Authorization("master admin access required"))
    }
}

fn required(field: &str, value: &str) -> Result<String, QueueError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(QueueError::Validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

async fn create_service(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Form<ServiceCreateForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    let name = required("name", &form.name)?;
    if form.price.is_some_and(|price| price < 0.0 || !price.is_finite()) {
        return Err(QueueError::Validation("price must be a non-negative amount".to_string()).into());
    }
    if form.duration_minutes.is_some_and(|minutes| minutes > MAX_SERVICE_MINUTES) {
        return Err(QueueError::Validation(format!(
            "duration_minutes must be at most {MAX_SERVICE_MINUTES}"
        ))
        .into());
    }

    let id = db::insert_service(&state.db, &name, form.duration_minutes, form.price)
        .await
        .map_err(|err| write_failed("service", err))?;
    log::info!("{} created service {id} ({name})", auth.display_name);
    Ok(HttpResponse::Created().json(json!({
        "id": id,
        "name": name,
        "duration_minutes": form.duration_minutes,
        "price": form.price,
        "active": true,
    })))
}

async fn toggle_service(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    require_master(&auth)?;
    let id = path.into_inner();
    let active = db::toggle_service(&state.db, id)
        .await
        .map_err(|err| write_failed("service", err))?
        .ok_or_else(|| QueueError::not_found("service", id))?;
    log::info!("{} set service {id} active={active}", auth.display_name);
    Ok(HttpResponse::Ok().json(json!({ "id": id, "active": active })))
}

async fn create_branch(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Form<BranchCreateForm>,
) -> Result<HttpResponse> {
    require_master(&auth)?;
    let form = form.into_inner();
    let code = required("code", &form.code)?.to_lowercase();
    let name = required("name", &form.name)?;
    let address = optional(form.address);
    let phone = optional(form.phone);

    db::insert_branch(&state.db, &code, &name, address.as_deref(), phone.as_deref())
        .await
        .map_err(|err| write_failed("branch", err))?;
    log::info!("{} created branch {code}", auth.display_name);
    Ok(HttpResponse::Created().json(json!({
        "code": code,
        "name": name,
        "address": address,
        "phone": phone,
        "active": true,
    })))
}

async fn create_barber(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Form<BarberCreateForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    let name = required("name", &form.name)?;
    let branch = optional(form.branch).unwrap_or_else(|| auth.scope.home_branch.clone());
    if !auth.scope.may_administer(&branch) {
        return Err(QueueError::Authorization("cannot add barbers to this branch").into());
    }

    let id = db::insert_barber(&state.db, &name, &branch)
        .await
        .map_err(|err| write_failed("barber", err))?;
    log::info!("{} added barber {id} at {branch}", auth.display_name);
    Ok(HttpResponse::Created().json(json!({
        "id": id,
        "name": name,
        "branch": branch,
        "active": true,
    })))
}

async fn toggle_barber(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let branch = db::barber_branch(&state.db, id)
        .await
        .map_err(|err| write_failed("barber", err))?
        .ok_or_else(|| QueueError::not_found("barber", id))?;
    if !auth.scope.may_administer(&branch) {
        return Err(QueueError::Authorization("cannot manage this barber").into());
    }

    let active = db::toggle_barber(&state.db, id)
        .await
        .map_err(|err| write_failed("barber", err))?
        .ok_or_else(|| QueueError::not_found("barber", id))?;
    log::info!("{} set barber {id} active={active}", auth.display_name);
    Ok(HttpResponse::Ok().json(json!({ "id": id, "active": active })))
}

async fn delete_barber(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let barber = state.engine.delete_barber(path.into_inner(), &auth.scope).await?;
    Ok(HttpResponse::Ok().json(barber))
}

async fn create_user(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Form<UserCreateForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    let username = required("username", &form.username)?;
    let display_name = required("display name", &form.display_name)?;
    if form.password.trim().len() < MIN_PASSWORD_LEN {
        return Err(QueueError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        ))
        .into());
    }
    let role = Role::parse(form.role.trim())
        .ok_or_else(|| QueueError::Validation(format!("unknown role '{}'", form.role.trim())))?;
    let branch = optional(form.branch).unwrap_or_else(|| auth.scope.home_branch.clone());

    // Branch admins hire staff for their own branch only.
    let allowed = match auth.scope.role {
        Role::MasterAdmin => true,
        Role::BranchAdmin => role == Role::Staff && auth.scope.may_administer(&branch),
        Role::Staff => false,
    };
    if !allowed {
        return Err(QueueError::Authorization("cannot create this user").into());
    }

    let exists = sqlx::query_scalar::<_, String>("SELECT code FROM branches WHERE code = ?")
        .bind(&branch)
        .fetch_optional(&state.db)
        .await
        .map_err(|err| write_failed("user", err))?;
    if exists.is_none() {
        return Err(QueueError::not_found("branch", &branch).into());
    }

    let id = db::insert_user(&state.db, &username, &display_name, &form.password, role, &branch)
        .await
        .map_err(|err| write_failed("user", err))?;
    log::info!(
        "{} created {} user '{username}' at {branch}",
        auth.display_name,
        role.as_str()
    );
    Ok(HttpResponse::Created().json(json!({
        "id": id,
        "username": username,
        "display_name": display_name,
        "role": role,
        "branch": branch,
    })))
}

async fn delete_customer(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    state
        .engine
        .purge_customer(path.into_inner(), &auth.scope)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}
