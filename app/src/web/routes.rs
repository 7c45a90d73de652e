// storefront/src/web/routes.rs

use actix_web::{error::JsonPayloadError, web, HttpRequest, HttpResponse};
use serde_json::json;

use crate::errors::AppError;
use crate::web::handlers::{
  admin_handlers, auth_handlers, cart_handlers, checkout_handlers, dashboard_handlers, order_handlers,
  product_handlers, profile_handlers, promotion_handlers, ticket_handlers, upload_handlers,
  webhook_handlers,
};

async fn health_check_handler() -> HttpResponse {
  HttpResponse::Ok().json(json!({ "success": true, "status": "ok" }))
}

/// Malformed JSON bodies answer with the same envelope as every other client error.
pub fn json_config(limit: usize) -> web::JsonConfig {
  web::JsonConfig::default()
    .limit(limit)
    .error_handler(|err: JsonPayloadError, _req: &HttpRequest| {
      AppError::Validation(format!("Invalid JSON body: {}", err)).into()
    })
}

/// Query strings that do not parse are client errors too.
pub fn query_config() -> web::QueryConfig {
  web::QueryConfig::default()
    .error_handler(|err, _req| AppError::Validation(format!("Invalid query string: {}", err)).into())
}

pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  cfg.service(
    web::scope("/api/v1")
      .route("/health", web::get().to(health_check_handler))
      .service(
        web::scope("/auth")
          .route("/signup", web::post().to(auth_handlers::signup_handler))
          .route("/signin", web::post().to(auth_handlers::signin_handler)),
      )
      .service(
        web::resource("/me")
          .route(web::get().to(profile_handlers::get_me_handler))
          .route(web::patch().to(profile_handlers::update_me_handler)),
      )
      // Catalog
      .service(
        web::scope("/products")
          .route("", web::get().to(product_handlers::list_products_handler))
          .route("/categories", web::get().to(product_handlers::list_categories_handler))
          .route("/{product_id}", web::get().to(product_handlers::get_product_handler)),
      )
      .service(web::resource("/promotions").route(web::get().to(promotion_handlers::promotions_handler)))
      // Cart and checkout
      .service(
        web::scope("/cart")
          .service(
            web::resource("")
              .route(web::get().to(cart_handlers::view_cart_handler))
              .route(web::delete().to(cart_handlers::clear_cart_handler)),
          )
          .route("/items", web::post().to(cart_handlers::add_to_cart_handler))
          .service(
            web::resource("/items/{item_id}")
              .route(web::patch().to(cart_handlers::update_cart_item_handler))
              .route(web::delete().to(cart_handlers::remove_cart_item_handler)),
          ),
      )
      .service(
        web::scope("/checkout")
          .route("", web::post().to(checkout_handlers::start_checkout_handler))
          .route("/status/{intent_id}", web::get().to(checkout_handlers::checkout_status_handler))
          .route(
            "/mock/{intent_id}/confirm",
            web::post().to(checkout_handlers::mock_confirm_handler),
          ),
      )
      .service(
        web::scope("/webhooks").route("/{source}", web::post().to(webhook_handlers::payment_webhook_handler)),
      )
      .service(
        web::scope("/orders")
          .route("", web::get().to(order_handlers::list_my_orders_handler))
          .route("/{order_id}", web::get().to(order_handlers::get_order_handler)),
      )
      // Support
      .service(
        web::scope("/tickets")
          .service(
            web::resource("")
              .route(web::post().to(ticket_handlers::open_ticket_handler))
              .route(web::get().to(ticket_handlers::list_my_tickets_handler)),
          )
          .route("/{ticket_id}", web::get().to(ticket_handlers::get_ticket_handler))
          .route("/{ticket_id}/messages", web::post().to(ticket_handlers::reply_ticket_handler)),
      )
      .route("/uploads/{kind}/{filename}", web::put().to(upload_handlers::upload_handler))
      .route("/uploads/{pathname:.*}", web::delete().to(upload_handlers::delete_upload_handler))
      // Staff
      .service(
        web::scope("/manage")
          .route("/products", web::post().to(product_handlers::create_product_handler))
          .service(
            web::resource("/products/{product_id}")
              .route(web::patch().to(product_handlers::update_product_handler))
              .route(web::delete().to(product_handlers::delete_product_handler)),
          )
          .route(
            "/products/{product_id}/variations",
            web::post().to(product_handlers::add_variation_handler),
          )
          .route(
            "/products/{product_id}/variations/{variation_id}",
            web::delete().to(product_handlers::delete_variation_handler),
          )
          .route("/orders", web::get().to(order_handlers::list_all_orders_handler))
          .route(
            "/orders/{order_id}/status",
            web::patch().to(order_handlers::update_order_status_handler),
          )
          .route("/tickets", web::get().to(ticket_handlers::list_all_tickets_handler))
          .route(
            "/tickets/{ticket_id}/status",
            web::patch().to(ticket_handlers::update_ticket_status_handler),
          )
          .route("/slides", web::post().to(promotion_handlers::create_slide_handler))
          .service(
            web::resource("/slides/{slide_id}")
              .route(web::patch().to(promotion_handlers::update_slide_handler))
              .route(web::delete().to(promotion_handlers::delete_slide_handler)),
          )
          .route("/best-sellers", web::put().to(promotion_handlers::set_best_sellers_handler))
          .service(
            web::resource("/on-sale/{product_id}")
              .route(web::put().to(promotion_handlers::put_on_sale_handler))
              .route(web::delete().to(promotion_handlers::remove_on_sale_handler)),
          ),
      )
      .service(
        web::scope("/admin")
          .route("/users", web::get().to(admin_handlers::list_users_handler))
          .route("/users/{user_id}", web::patch().to(admin_handlers::update_user_access_handler)),
      )
      .service(
        web::scope("/dashboard")
          .route("/customer", web::get().to(dashboard_handlers::customer_dashboard_handler))
          .route("/manager", web::get().to(dashboard_handlers::manager_dashboard_handler))
          .route("/editor", web::get().to(dashboard_handlers::editor_dashboard_handler))
          .route("/admin", web::get().to(dashboard_handlers::admin_dashboard_handler)),
      ),
  );

  // Browser-facing pages and public blobs.
  cfg
    .route("/blobs/{pathname:.*}", web::get().to(upload_handlers::serve_blob_handler))
    .route("/checkout/return", web::get().to(checkout_handlers::checkout_return_handler))
    .route("/checkout/failed", web::get().to(checkout_handlers::checkout_failed_page))
    .route(
      "/orders/{order_id}/confirmation",
      web::get().to(checkout_handlers::order_confirmation_page),
    );
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::state::AppState;
  use actix_web::http::{header, StatusCode};
  use actix_web::{test, App};

  async fn call(req: test::TestRequest) -> (StatusCode, serde_json::Value) {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::for_tests(dir.path());
    let app = test::init_service(
      App::new()
        .app_data(web::Data::new(state))
        .app_data(json_config(1024))
        .app_data(query_config())
        .configure(configure_app_routes),
    )
    .await;
    let resp = test::call_service(&app, req.to_request()).await;
    let status = resp.status();
    let body = test::read_body(resp).await;
    let value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, value)
  }

  #[actix_web::test]
  async fn health_reports_ok() {
    let (status, body) = call(test::TestRequest::get().uri("/api/v1/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
  }

  #[actix_web::test]
  async fn private_routes_require_a_session() {
    for uri in ["/api/v1/cart", "/api/v1/orders", "/api/v1/me", "/api/v1/dashboard/customer"] {
      let (status, body) = call(test::TestRequest::get().uri(uri)).await;
      assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
      assert_eq!(body["success"], false);
    }
  }

  #[actix_web::test]
  async fn malformed_json_uses_the_error_envelope() {
    let (status, body) = call(
      test::TestRequest::post()
        .uri("/api/v1/auth/signup")
        .insert_header((header::CONTENT_TYPE, "application/json"))
        .set_payload("{not json"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
  }

  #[actix_web::test]
  async fn unknown_routes_are_not_found() {
    let (status, _) = call(test::TestRequest::get().uri("/api/v1/nowhere")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
  }
}
