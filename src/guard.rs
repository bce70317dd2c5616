use rocket::{
    http::{Cookie, CookieJar, Status},
    request::{FromRequest, Outcome},
    Request,
};

use crate::{
    error::{SessionError, SessionResult},
    options::SessionOptions,
    service::{Lookup, SessionService},
    Session,
};

/// Type of the cached session lookup in Rocket's request local cache
pub(crate) struct LocalCachedSession(SessionResult<Session>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Session {
    /// Storage error that prevented resolving the session
    type Error = &'r SessionError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let service = get_service(req.rocket());
        let cookie_jar = req.cookies();

        let LocalCachedSession(cached) = req
            .local_cache_async(async {
                let id = requested_session_id(req, service.options());
                LocalCachedSession(resolve_session(id, service, cookie_jar).await)
            })
            .await;

        match cached {
            Ok(session) => Outcome::Success(session.clone()),
            Err(e) => Outcome::Error((Status::InternalServerError, e)),
        }
    }
}

/// Get the session service from Rocket state
#[inline(always)]
fn get_service(rocket: &rocket::Rocket<rocket::Orbit>) -> &SessionService {
    rocket.state::<SessionService>().unwrap_or_else(|| {
        panic!("The RocketSessionStore fairing should be attached to the server")
    })
}

/// Session ID from the session cookie, falling back to the session header
fn requested_session_id(req: &Request<'_>, options: &SessionOptions) -> Option<String> {
    if let Some(cookie) = req.cookies().get(&options.cookie_name) {
        rocket::debug!("Got session id '{}' from cookie", cookie.value());
        return Some(cookie.value().to_owned());
    }
    let header = req.headers().get_one(&options.header_name)?;
    rocket::debug!("Got session id '{header}' from header");
    Some(header.to_owned())
}

/// Get the requested session, or start a new one. The session cookie is set
/// whenever a session is created.
async fn resolve_session(
    id: Option<String>,
    service: &SessionService,
    cookie_jar: &CookieJar<'_>,
) -> SessionResult<Session> {
    let lookup = match id {
        Some(id) => match service.get(&id, true).await {
            Ok(lookup) => lookup,
            Err(e @ (SessionError::BlankId | SessionError::InvalidId)) => {
                rocket::debug!("Ignoring requested session id: {e}. Creating new session...");
                Lookup::Created(service.new_session().await?)
            }
            Err(e) => return Err(e),
        },
        None => {
            rocket::debug!("No session id found. Creating new session...");
            Lookup::Created(service.new_session().await?)
        }
    };

    let created = lookup.is_created();
    let session = lookup.into_session().ok_or(SessionError::NotFound)?;
    if created {
        cookie_jar.add(session_cookie(session.id(), service.options()));
    }
    Ok(session)
}

fn session_cookie(id: &str, options: &SessionOptions) -> Cookie<'static> {
    let mut cookie = Cookie::build((options.cookie_name.clone(), id.to_owned()))
        .path(options.path.clone())
        .http_only(options.http_only)
        .same_site(options.same_site)
        .secure(options.secure);
    if let Some(domain) = &options.domain {
        cookie = cookie.domain(domain.clone());
    }
    cookie.build()
}

/// If using rocket-okapi, this implements OpenApiFromRequest for Session to ignore the request guard
#[cfg(feature = "rocket_okapi")]
impl<'r> rocket_okapi::request::OpenApiFromRequest<'r> for Session {
    fn from_request_input(
        _gen: &mut rocket_okapi::gen::OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<rocket_okapi::request::RequestHeaderInput> {
        Ok(rocket_okapi::request::RequestHeaderInput::None)
    }
}
