use actix_web::{web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde::Deserialize;

use crate::{
    auth::{staff_validator, AuthUser},
    models::NewCustomer,
    queue::{CustomerRef, EnqueueRequest, QueueError},
    routes::optional,
    state::AppState,
};

#[derive(Deserialize)]
struct CustomerForm {
    name: String,
    phone: String,
    email: Option<String>,
    address: Option<String>,
    photo: Option<String>,
}

impl CustomerForm {
    fn into_new(self) -> NewCustomer {
        NewCustomer {
            name: self.name,
            phone: self.phone,
            email: self.email,
            address: self.address,
            photo: self.photo,
        }
    }
}

#[derive(Deserialize)]
struct EnqueueForm {
    customer_id: Option<i64>,
    name: Option<String>,
    phone: Option<String>,
    email: Option<String>,
    address: Option<String>,
    service_id: i64,
    branch: Option<String>,
    notes: Option<String>,
}

#[derive(Deserialize)]
struct AssignForm {
    barber_id: i64,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/staff")
            .wrap(HttpAuthentication::basic(staff_validator))
            .service(web::resource("/customers").route(web::post().to(register_customer)))
            .service(web::resource("/customers/{id}/history").route(web::get().to(customer_history)))
            .service(web::resource("/queue").route(web::post().to(enqueue)))
            .service(web::resource("/queue/{id}").route(web::delete().to(remove)))
            .service(web::resource("/queue/{id}/assign").route(web::post().to(assign)))
            .service(web::resource("/queue/{id}/complete").route(web::post().to(complete)))
            .service(web::resource("/queue/{id}/cancel").route(web::post().to(cancel)))
            .service(web::resource("/branches/{branch}/summary").route(web::get().to(summary))),
    );
}

async fn register_customer(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Form<CustomerForm>,
) -> Result<HttpResponse> {
    let customer = state
        .engine
        .register(form.into_inner().into_new(), &auth.scope)
        .await?;
    Ok(HttpResponse::Ok().json(customer))
}

async fn customer_history(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let visits = state
        .engine
        .history(path.into_inner(), &auth.scope)
        .await?;
    Ok(HttpResponse::Ok().json(visits))
}

async fn enqueue(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Form<EnqueueForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    let customer = match form.customer_id {
        Some(id) => CustomerRef::Existing(id),
        None => {
            let (Some(name), Some(phone)) = (form.name, form.phone) else {
                return Err(QueueError::Validation(
                    "customer_id or name and phone are required".to_string(),
                )
                .into());
            };
            CustomerRef::New(NewCustomer {
                name,
                phone,
                email: form.email,
                address: form.address,
                photo: None,
            })
        }
    };

    let request = EnqueueRequest {
        customer,
        service_id: form.service_id,
        branch: optional(form.branch).unwrap_or_else(|| auth.scope.home_branch.clone()),
        notes: form.notes,
    };
    let customer = state.engine.enqueue(request, &auth.scope).await?;
    log::info!("{} queued customer {}", auth.display_name, customer.id);
    Ok(HttpResponse::Created().json(customer))
}

async fn assign(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<i64>,
    form: web::Form<AssignForm>,
) -> Result<HttpResponse> {
    let customer = state
        .engine
        .assign(path.into_inner(), form.barber_id, &auth.scope)
        .await?;
    Ok(HttpResponse::Ok().json(customer))
}

async fn complete(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let customer = state.engine.complete(path.into_inner(), &auth.scope).await?;
    Ok(HttpResponse::Ok().json(customer))
}

async fn cancel(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let customer = state.engine.cancel(path.into_inner(), &auth.scope).await?;
    Ok(HttpResponse::Ok().json(customer))
}

async fn remove(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    state.engine.remove(path.into_inner(), &auth.scope).await?;
    Ok(HttpResponse::NoContent().finish())
}

async fn summary(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let summary = state
        .engine
        .branch_summary(&path.into_inner(), &auth.scope)
        .await?;
    Ok(HttpResponse::Ok().json(summary))
}
