use rocket::Route;

mod admin;
mod auth;
mod common;
mod results;
mod structure;
mod voting;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(auth::routes());
    routes.extend(admin::routes());
    routes.extend(structure::routes());
    routes.extend(voting::routes());
    routes.extend(results::routes());
    routes
}
