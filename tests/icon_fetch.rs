use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use url::Url;

use questcard::extract::fetch_icon_data_uri;

static ICON_PNG: &[u8] = &[
    137, 80, 78, 71, 13, 10, 26, 10, 0, 0, 0, 13, 73, 72, 68, 82, 0, 0, 0, 1, 0, 0, 0, 1, 8, 4, 0,
    0, 0, 181, 28, 12, 2, 0, 0, 0, 11, 73, 68, 65, 84, 120, 218, 99, 252, 255, 23, 0, 2, 3, 1, 128,
    110, 220, 25, 0, 0, 0, 0, 73, 69, 78, 68, 174, 66, 96, 130,
];

fn spawn_icon_server() -> (String, mpsc::Sender<()>, thread::JoinHandle<()>) {
    let server = tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server");
    let addr = server.server_addr();
    let base_url = format!("http://{addr}");

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

    let handle = thread::spawn(move || {
        loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }
            let request = match server.recv_timeout(Duration::from_millis(50)) {
                Ok(Some(req)) => req,
                Ok(None) => continue,
                Err(_) => break,
            };

            match request.url() {
                "/icons/rathalos.png" => {
                    let mut resp = tiny_http::Response::from_data(ICON_PNG.to_vec());
                    let header = tiny_http::Header::from_bytes(
                        &b"Content-Type"[..],
                        &b"image/png"[..],
                    )
                    .expect("content-type header");
                    resp.add_header(header);
                    let _ = request.respond(resp);
                }
                "/icons/empty.png" => {
                    let _ = request.respond(tiny_http::Response::from_data(Vec::new()));
                }
                _ => {
                    let _ = request.respond(
                        tiny_http::Response::from_string("not found").with_status_code(404),
                    );
                }
            }
        }
    });

    (base_url, shutdown_tx, handle)
}

#[tokio::test]
async fn icon_is_inlined_as_a_png_data_uri() {
    let (base_url, shutdown_tx, handle) = spawn_icon_server();
    let client = reqwest::Client::new();
    let url = Url::parse(&format!("{base_url}/icons/rathalos.png")).unwrap();

    let data_uri = fetch_icon_data_uri(&client, &url).await.unwrap();
    assert!(data_uri.starts_with("data:image/png;base64,"));

    use base64::Engine as _;
    let encoded = data_uri.strip_prefix("data:image/png;base64,").unwrap();
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .unwrap();
    assert_eq!(decoded, ICON_PNG);

    let _ = shutdown_tx.send(());
    let _ = handle.join();
}

#[tokio::test]
async fn missing_icon_is_an_error_for_the_caller_to_swallow() {
    let (base_url, shutdown_tx, handle) = spawn_icon_server();
    let client = reqwest::Client::new();
    let url = Url::parse(&format!("{base_url}/icons/unknown.png")).unwrap();

    let err = fetch_icon_data_uri(&client, &url).await.unwrap_err();
    assert!(err.to_string().contains("404"));

    let _ = shutdown_tx.send(());
    let _ = handle.join();
}

#[tokio::test]
async fn empty_icon_body_is_rejected() {
    let (base_url, shutdown_tx, handle) = spawn_icon_server();
    let client = reqwest::Client::new();
    let url = Url::parse(&format!("{base_url}/icons/empty.png")).unwrap();

    let err = fetch_icon_data_uri(&client, &url).await.unwrap_err();
    assert!(err.to_string().contains("empty body"));

    let _ = shutdown_tx.send(());
    let _ = handle.join();
}
