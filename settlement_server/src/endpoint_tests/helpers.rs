use actix_web::{
    body::MessageBody,
    dev::{Service, ServiceResponse},
    http::StatusCode,
    test,
    test::TestRequest,
    web::ServiceConfig,
    App,
};
use log::debug;

pub async fn get_request<F>(path: &str, configure: F) -> Result<(StatusCode, String), String>
where F: FnOnce(&mut ServiceConfig) {
    let req = TestRequest::get().uri(path).to_request();
    let app = App::new().configure(configure);
    let service = test::init_service(app).await;
    debug!("Making request to {path}");
    let res = test::try_call_service(&service, req).await.map_err(|e| e.to_string())?;
    Ok(into_parts(res))
}

pub async fn post_request<S>(
    service: &S,
    path: &str,
    body: &str,
    headers: &[(&str, &str)],
) -> Result<(StatusCode, String), String>
where
    S: Service<actix_http::Request, Response = ServiceResponse, Error = actix_web::Error>,
{
    let mut req = TestRequest::post().uri(path).insert_header(("Content-Type", "application/json"));
    for (name, value) in headers {
        req = req.insert_header((*name, *value));
    }
    let req = req.set_payload(body.to_string()).to_request();
    debug!("Posting to {path}: {body}");
    let res = test::try_call_service(service, req).await.map_err(|e| e.to_string())?;
    Ok(into_parts(res))
}

fn into_parts(res: ServiceResponse) -> (StatusCode, String) {
    let (_, res) = res.into_parts();
    let status = res.status();
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap_or_default()).into_owned();
    (status, body)
}
