//! Walks a running backend through the business flow end to end: signup,
//! session, form management, QR, public submission, and cleanup.
use anyhow::{Context, Result, ensure};
use clap::Parser;
use forms::FieldType;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(long, default_value = "http://localhost:3000")]
    base_url: String,

    /// Sent as `frontendBaseUrl` when generating the QR code.
    #[arg(long)]
    frontend_base_url: Option<String>,
}

const STEPS: u64 = 12;

struct Smoke {
    client: Client,
    base_url: String,
}

impl Smoke {
    async fn expect(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
        expected: StatusCode,
    ) -> Result<Value> {
        let mut request = self
            .client
            .request(method.clone(), format!("{}{path}", self.base_url));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("{method} {path} failed"))?;
        let status = response.status();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);

        ensure!(
            status == expected,
            "{method} {path}: expected {expected}, got {status}: {body}"
        );

        Ok(body)
    }
}

/// One field per supported type, with spaced names so the server has to
/// normalize them.
fn sample_fields() -> Vec<Value> {
    FieldType::ALL
        .iter()
        .map(|kind| {
            let mut field = json!({
                "name": format!("q_{kind}"),
                "label": format!("Question {kind}"),
                "type": kind.as_str().replace('_', " "),
            });
            if kind.has_options() {
                field["options"] = json!(["Yes", "No"]);
            }
            field
        })
        .collect()
}

fn text<'a>(body: &'a Value, pointer: &str) -> Result<&'a str> {
    body.pointer(pointer)
        .and_then(Value::as_str)
        .with_context(|| format!("response is missing {pointer}: {body}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let smoke = Smoke {
        client: Client::builder().cookie_store(true).build()?,
        base_url: args.base_url.trim_end_matches('/').to_string(),
    };

    let pb = ProgressBar::new(STEPS);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )?
        .progress_chars("=> "),
    );

    let email = format!("smoke-{}@example.com", Uuid::new_v4().simple());
    let password = "smoke-password";

    pb.set_message("Health");
    smoke
        .expect(Method::GET, "/health", None, None, StatusCode::OK)
        .await?;
    pb.inc(1);

    pb.set_message("Register");
    smoke
        .expect(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({
                "email": email,
                "password": password,
                "role": "business",
                "businessname": "Smoke Cafe",
                "location": "Test Street",
                "pancardNumber": 100200300,
                "description": "Created by the smoke tester",
            })),
            StatusCode::CREATED,
        )
        .await?;
    pb.inc(1);

    pb.set_message("Login");
    let login = smoke
        .expect(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": email, "password": password })),
            StatusCode::OK,
        )
        .await?;
    let token = text(&login, "/token")?.to_string();
    pb.inc(1);

    pb.set_message("Session cookie");
    let me = smoke
        .expect(Method::GET, "/api/auth/me", None, None, StatusCode::OK)
        .await?;
    ensure!(text(&me, "/data/role")? == "business", "unexpected role: {me}");
    pb.inc(1);

    pb.set_message("Business profile");
    smoke
        .expect(
            Method::GET,
            "/api/business/me",
            Some(&token),
            None,
            StatusCode::OK,
        )
        .await?;
    pb.inc(1);

    pb.set_message("Create form");
    let created = smoke
        .expect(
            Method::POST,
            "/api/feedback-forms",
            Some(&token),
            Some(json!({
                "title": "Smoke survey",
                "description": "Every field type once",
                "fields": sample_fields(),
            })),
            StatusCode::CREATED,
        )
        .await?;
    let form_id = text(&created, "/feedbackForm/_id")?.to_string();
    let form_path = format!("/api/feedback-forms/{form_id}");
    pb.inc(1);

    pb.set_message("List forms");
    let listed = smoke
        .expect(
            Method::GET,
            "/api/feedback-forms",
            Some(&token),
            None,
            StatusCode::OK,
        )
        .await?;
    let found = listed["feedbackForms"]
        .as_array()
        .is_some_and(|forms| forms.iter().any(|f| f["_id"] == form_id.as_str()));
    ensure!(found, "created form {form_id} missing from list");
    pb.inc(1);

    pb.set_message("QR code");
    let qr_body = args
        .frontend_base_url
        .as_ref()
        .map(|url| json!({ "frontendBaseUrl": url }));
    let qr = smoke
        .expect(
            Method::POST,
            &format!("{form_path}/qr"),
            Some(&token),
            qr_body,
            StatusCode::OK,
        )
        .await?;
    ensure!(
        text(&qr, "/qrCodeDataUrl")?.starts_with("data:image/png;base64,"),
        "QR code is not a PNG data URL"
    );
    let form_url = text(&qr, "/formUrl")?.to_string();
    pb.inc(1);

    pb.set_message("Submit response");
    smoke
        .expect(
            Method::POST,
            "/api/form-responses",
            None,
            Some(json!({
                "formId": form_id,
                "answers": [
                    { "fieldName": "q_short_text", "value": "All good" },
                    { "fieldName": "q_checkbox", "value": ["Yes"] },
                ],
            })),
            StatusCode::CREATED,
        )
        .await?;
    pb.inc(1);

    pb.set_message("List responses");
    let responses = smoke
        .expect(
            Method::GET,
            &format!("{form_path}/responses"),
            Some(&token),
            None,
            StatusCode::OK,
        )
        .await?;
    let count = responses["formResponses"].as_array().map_or(0, Vec::len);
    ensure!(count == 1, "expected 1 response, found {count}");
    pb.inc(1);

    pb.set_message("Delete form");
    smoke
        .expect(
            Method::DELETE,
            &form_path,
            Some(&token),
            None,
            StatusCode::OK,
        )
        .await?;
    pb.inc(1);

    pb.set_message("Deleted form is gone");
    smoke
        .expect(Method::GET, &form_path, None, None, StatusCode::NOT_FOUND)
        .await?;
    pb.inc(1);

    pb.finish_with_message("Done");

    println!("\nForm URL: {form_url}");
    println!("Account: {email}");

    Ok(())
}
