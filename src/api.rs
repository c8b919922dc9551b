use std::sync::Arc;

use chrono::NaiveDate;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{extract_detail, GatewayError};
use crate::models::{
    AttendanceRecord, GradeRecord, NewAttendance, NewGrade, NewStudent, NewUser, Student,
    StudentUpdate, Token, User,
};
use crate::session::Session;

/// Client for the student-records backend. Every method is one round trip.
#[derive(Clone)]
pub struct Gateway {
    base_url: String,
    client: Client,
    session: Arc<Session>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentQuery {
    pub name: Option<String>,
    pub student_number: Option<String>,
    pub class_name: Option<String>,
}

impl StudentQuery {
    fn params(&self) -> Vec<(&'static str, &str)> {
        [
            ("name", self.name.as_deref()),
            ("student_number", self.student_number.as_deref()),
            ("class_name", self.class_name.as_deref()),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.filter(|v| !v.trim().is_empty()).map(|v| (key, v)))
        .collect()
    }
}

impl Gateway {
    pub fn new(config: &Config, session: Arc<Session>) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(GatewayError::Network)?;

        Ok(Self {
            base_url: config.api_url.clone(),
            client,
            session,
        })
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    // --- auth ---

    pub async fn login(&self, username: &str, password: &str) -> Result<Token, GatewayError> {
        let builder = self
            .request(Method::POST, "/auth/login")
            .form(&[("username", username), ("password", password)]);
        let response = self.dispatch_as(builder, OnUnauthorized::RejectCredentials).await?;
        let token: Token = decode(response).await?;
        if !token.token_type.eq_ignore_ascii_case("bearer") {
            error!(token_type = %token.token_type, "unsupported token type");
            return Err(GatewayError::Decode(format!(
                "unsupported token type `{}`",
                token.token_type
            )));
        }
        info!(username, "login succeeded");
        Ok(token)
    }

    pub async fn register(&self, user: &NewUser) -> Result<User, GatewayError> {
        let builder = self.request(Method::POST, "/auth/register").json(user);
        self.send(builder).await
    }

    // --- students ---

    pub async fn list_students(&self) -> Result<Vec<Student>, GatewayError> {
        self.send(self.request(Method::GET, "/students/")).await
    }

    pub async fn get_student(&self, id: i64) -> Result<Student, GatewayError> {
        self.send(self.request(Method::GET, &format!("/students/{id}")))
            .await
    }

    pub async fn search_students(&self, query: &StudentQuery) -> Result<Vec<Student>, GatewayError> {
        let builder = self
            .request(Method::GET, "/students/search")
            .query(&query.params());
        self.send(builder).await
    }

    pub async fn create_student(&self, student: &NewStudent) -> Result<Student, GatewayError> {
        self.send_json(Method::POST, "/students/", student).await
    }

    pub async fn update_student(
        &self,
        id: i64,
        update: &StudentUpdate,
    ) -> Result<Student, GatewayError> {
        self.send_json(Method::PUT, &format!("/students/{id}"), update)
            .await
    }

    pub async fn delete_student(&self, id: i64) -> Result<(), GatewayError> {
        self.send_empty(self.request(Method::DELETE, &format!("/students/{id}")))
            .await
    }

    // --- attendance ---

    pub async fn list_attendance(
        &self,
        student_id: Option<i64>,
    ) -> Result<Vec<AttendanceRecord>, GatewayError> {
        let path = match student_id {
            Some(id) => format!("/attendance/student/{id}"),
            None => "/attendance/".to_string(),
        };
        self.send(self.request(Method::GET, &path)).await
    }

    pub async fn get_attendance(&self, id: i64) -> Result<AttendanceRecord, GatewayError> {
        self.send(self.request(Method::GET, &format!("/attendance/{id}")))
            .await
    }

    pub async fn create_attendance(
        &self,
        record: &NewAttendance,
    ) -> Result<AttendanceRecord, GatewayError> {
        self.send_json(Method::POST, "/attendance/", record).await
    }

    pub async fn update_attendance(
        &self,
        id: i64,
        record: &NewAttendance,
    ) -> Result<AttendanceRecord, GatewayError> {
        self.send_json(Method::PUT, &format!("/attendance/{id}"), record)
            .await
    }

    pub async fn delete_attendance(&self, id: i64) -> Result<(), GatewayError> {
        self.send_empty(self.request(Method::DELETE, &format!("/attendance/{id}")))
            .await
    }

    // --- grades ---

    pub async fn list_grades(&self, student_id: Option<i64>) -> Result<Vec<GradeRecord>, GatewayError> {
        let path = match student_id {
            Some(id) => format!("/grades/student/{id}"),
            None => "/grades/".to_string(),
        };
        self.send(self.request(Method::GET, &path)).await
    }

    pub async fn get_grade(&self, id: i64) -> Result<GradeRecord, GatewayError> {
        self.send(self.request(Method::GET, &format!("/grades/{id}")))
            .await
    }

    pub async fn create_grade(&self, grade: &NewGrade) -> Result<GradeRecord, GatewayError> {
        self.send_json(Method::POST, "/grades/", grade).await
    }

    pub async fn update_grade(&self, id: i64, grade: &NewGrade) -> Result<GradeRecord, GatewayError> {
        self.send_json(Method::PUT, &format!("/grades/{id}"), grade)
            .await
    }

    pub async fn delete_grade(&self, id: i64) -> Result<(), GatewayError> {
        self.send_empty(self.request(Method::DELETE, &format!("/grades/{id}")))
            .await
    }

    // --- pre-aggregated stats; payloads stay loosely typed ---

    pub async fn dashboard_stats(&self) -> Result<serde_json::Value, GatewayError> {
        self.send(self.request(Method::GET, "/stats/dashboard")).await
    }

    pub async fn attendance_summary(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<serde_json::Value, GatewayError> {
        let mut params = Vec::new();
        if let Some(start) = start {
            params.push(("start_date", start.to_string()));
        }
        if let Some(end) = end {
            params.push(("end_date", end.to_string()));
        }
        let builder = self
            .request(Method::GET, "/stats/attendance/summary")
            .query(&params);
        self.send(builder).await
    }

    pub async fn attendance_daily(&self, days: u32) -> Result<serde_json::Value, GatewayError> {
        let builder = self
            .request(Method::GET, "/stats/attendance/daily")
            .query(&[("days", days)]);
        self.send(builder).await
    }

    pub async fn grade_summary(&self) -> Result<serde_json::Value, GatewayError> {
        self.send(self.request(Method::GET, "/stats/grades/summary"))
            .await
    }

    pub async fn grades_by_subject(&self) -> Result<serde_json::Value, GatewayError> {
        self.send(self.request(Method::GET, "/stats/grades/by-subject"))
            .await
    }

    pub async fn grade_distribution(&self) -> Result<serde_json::Value, GatewayError> {
        self.send(self.request(Method::GET, "/stats/grades/distribution"))
            .await
    }

    pub async fn grade_ranking(&self, limit: usize) -> Result<serde_json::Value, GatewayError> {
        let builder = self
            .request(Method::GET, "/stats/grades/ranking")
            .query(&[("limit", limit)]);
        self.send(builder).await
    }

    // --- plumbing ---

    /// Builds a request against the gateway with the session credential attached.
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "gateway request");
        let builder = self.client.request(method, url);
        match self.session.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T, GatewayError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(self.request(method, path).json(body)).await
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, GatewayError> {
        decode(self.dispatch(builder).await?).await
    }

    async fn send_empty(&self, builder: RequestBuilder) -> Result<(), GatewayError> {
        self.dispatch(builder).await.map(|_| ())
    }

    async fn dispatch(&self, builder: RequestBuilder) -> Result<Response, GatewayError> {
        self.dispatch_as(builder, OnUnauthorized::ExpireSession).await
    }

    async fn dispatch_as(
        &self,
        builder: RequestBuilder,
        on_unauthorized: OnUnauthorized,
    ) -> Result<Response, GatewayError> {
        let response = builder.send().await.map_err(|err| {
            error!(error = %err, "gateway unreachable");
            GatewayError::from(err)
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED && on_unauthorized == OnUnauthorized::RejectCredentials {
            let detail = extract_detail(&response.text().await.unwrap_or_default());
            warn!(detail = detail.as_deref().unwrap_or(""), "credentials rejected");
            return Err(GatewayError::InvalidCredentials(detail));
        }

        if status == StatusCode::UNAUTHORIZED {
            if self.session.expire() {
                warn!("authorization rejected; session cleared");
            }
            return Err(GatewayError::Unauthorized);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = extract_detail(&body);
        warn!(%status, detail = detail.as_deref().unwrap_or(""), "gateway rejected request");

        if status == StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound(
                detail.unwrap_or_else(|| "Record not found".to_string()),
            ));
        }
        Err(GatewayError::Rejected { status, detail })
    }
}

/// What a 401 means for the request being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnUnauthorized {
    /// The stored token is no longer accepted.
    ExpireSession,
    /// The submitted username or password was wrong.
    RejectCredentials,
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
    response.json::<T>().await.map_err(|err| {
        error!(error = %err, "could not decode gateway response");
        GatewayError::Decode(err.to_string())
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::AttendanceStatus;
    use serde_json::json;
    use std::path::PathBuf;
    use std::time::Duration;
    use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn gateway_for(server: &MockServer, token: Option<&str>) -> Gateway {
        let config = Config {
            api_url: format!("{}/api", server.uri()),
            session_file: PathBuf::from("unused"),
            timeout: Duration::from_secs(5),
        };
        let session = Arc::new(Session::in_memory(token.map(str::to_string)));
        Gateway::new(&config, session).unwrap()
    }

    #[tokio::test]
    async fn attaches_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/students/"))
            .and(header("authorization", "Bearer t0ken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 1, "name": "Kim", "student_number": "2026001", "class_name": "1-1"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = gateway_for(&server, Some("t0ken"));
        let students = gateway.list_students().await.unwrap();
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].name, "Kim");
    }

    #[tokio::test]
    async fn login_posts_form_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .and(body_string_contains("username=admin"))
            .and(body_string_contains("password=admin123"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "jwt", "token_type": "bearer"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let gateway = gateway_for(&server, None);
        let token = gateway.login("admin", "admin123").await.unwrap();
        assert_eq!(token.access_token, "jwt");
    }

    #[tokio::test]
    async fn wrong_password_keeps_existing_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({"detail": "Incorrect username or password"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let gateway = gateway_for(&server, Some("still-valid"));
        let err = gateway.login("admin", "typo").await.unwrap_err();
        assert!(!err.is_unauthorized());
        assert_eq!(
            err.user_message("Login failed. Check the username and password."),
            "Incorrect username or password"
        );
        assert_eq!(gateway.session().token().as_deref(), Some("still-valid"));
        assert!(!gateway.session().is_expired());
    }

    #[tokio::test]
    async fn login_rejects_non_bearer_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "jwt", "token_type": "mac"})),
            )
            .mount(&server)
            .await;

        let gateway = gateway_for(&server, None);
        assert!(matches!(
            gateway.login("admin", "admin123").await,
            Err(GatewayError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn unauthorized_clears_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Not authenticated"})))
            .mount(&server)
            .await;

        let gateway = gateway_for(&server, Some("stale"));
        let err = gateway.list_grades(None).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(gateway.session().token().is_none());
        assert!(gateway.session().is_expired());
    }

    #[tokio::test]
    async fn concurrent_unauthorized_calls_redirect_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .expect(3)
            .mount(&server)
            .await;

        let gateway = gateway_for(&server, Some("stale"));
        let (a, b, c) = tokio::join!(
            gateway.list_students(),
            gateway.list_attendance(None),
            gateway.dashboard_stats()
        );
        assert!(a.unwrap_err().is_unauthorized());
        assert!(b.unwrap_err().is_unauthorized());
        assert!(c.unwrap_err().is_unauthorized());

        // every observer after the first sees an already-expired session
        assert!(!gateway.session().expire());
    }

    #[tokio::test]
    async fn conflict_detail_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/students/"))
            .and(body_json(json!({"name": "Kim", "student_number": "1", "class_name": "1-1"})))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"detail": "Student number already exists"})),
            )
            .mount(&server)
            .await;

        let gateway = gateway_for(&server, Some("t"));
        let err = gateway
            .create_student(&NewStudent {
                name: "Kim".to_string(),
                student_number: "1".to_string(),
                class_name: "1-1".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.user_message("fallback"), "Student number already exists");
    }

    #[tokio::test]
    async fn scoped_lists_use_student_routes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/attendance/student/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 3, "student_id": 7, "date": "2026-10-16", "status": "출석"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = gateway_for(&server, Some("t"));
        let records = gateway.list_attendance(Some(7)).await.unwrap();
        assert_eq!(records[0].status, AttendanceStatus::Present);
    }

    #[tokio::test]
    async fn search_skips_blank_parameters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/students/search"))
            .and(query_param("class_name", "2-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = gateway_for(&server, Some("t"));
        let query = StudentQuery {
            name: Some("  ".to_string()),
            class_name: Some("2-1".to_string()),
            ..Default::default()
        };
        assert_eq!(query.params(), vec![("class_name", "2-1")]);
        assert!(gateway.search_students(&query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_record_maps_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/grades/99"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Grade not found"})))
            .mount(&server)
            .await;

        let gateway = gateway_for(&server, Some("t"));
        match gateway.get_grade(99).await {
            Err(GatewayError::NotFound(detail)) => assert_eq!(detail, "Grade not found"),
            other => panic!("expected not found, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/students/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let gateway = gateway_for(&server, Some("t"));
        let err = gateway.list_students().await.unwrap_err();
        assert!(matches!(err, GatewayError::Decode(_)));
        assert_eq!(err.user_message("Loading failed"), "Loading failed");
    }
}
