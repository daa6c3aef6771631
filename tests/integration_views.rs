use std::sync::Arc;

use natours::create_app;
use natours::test_helpers::{
    PUBLIC_DIR, TestDb, insert_tour, insert_user, make_rate_limiter_permissive_and_purge, spawn_app, test_state,
};
use natours::utils::email::MemoryMailer;
use reqwest::StatusCode;
use serde_json::{Value, json};
use serial_test::serial;

#[tokio::test]
#[serial]
async fn rendered_pages() {
    let Some(db) = TestDb::create("views").await else { return };
    make_rate_limiter_permissive_and_purge().await;

    let pool = &db.pool;
    insert_user(pool, "Ben Hadley", "ben@example.com", "test1234", "user").await.unwrap();
    insert_tour(pool, "The Forest Hiker", 397.0).await.unwrap();
    insert_tour(pool, "The Sea Explorer", 497.0).await.unwrap();
    let secret = insert_tour(pool, "The Secret Mountain Walk", 1497.0).await.unwrap();
    sqlx::query("UPDATE tours SET secret_tour = TRUE WHERE id = ?")
        .bind(secret)
        .execute(pool)
        .await
        .unwrap();

    let state = test_state(db.pool.clone(), Arc::new(MemoryMailer::new()), PUBLIC_DIR).unwrap();
    let base = spawn_app(create_app(state)).await.expect("serve");
    let client = reqwest::Client::new();

    // Overview
    let res = client.get(format!("{}/", base)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-content-type-options"], "nosniff");
    let html = res.text().await.unwrap();
    assert!(html.contains("<title>Natours | All Tours</title>"));
    assert!(html.contains("The Forest Hiker"));
    assert!(html.contains("The Sea Explorer"));
    assert!(!html.contains("The Secret Mountain Walk"));
    assert!(html.contains("Log in"));

    // Tour detail
    let res = client.get(format!("{}/tour/the-sea-explorer", base)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let csp = res.headers()["content-security-policy"].to_str().unwrap().to_string();
    assert!(csp.contains("https://js.stripe.com"));
    let html = res.text().await.unwrap();
    assert!(html.contains("<title>Natours | The Sea Explorer Tour</title>"));

    let res = client.get(format!("{}/tour/the-secret-mountain-walk", base)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client.get(format!("{}/tour/no-such-tour", base)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(res.headers()["content-type"].to_str().unwrap().starts_with("text/html"));
    let html = res.text().await.unwrap();
    assert!(html.contains("There is no tour with that name."));

    // Logged in through the cookie
    let res = client
        .post(format!("{}/api/v1/users/login", base))
        .json(&json!({"email": "ben@example.com", "password": "test1234"}))
        .send()
        .await
        .unwrap();
    let token = res.json::<Value>().await.unwrap()["token"].as_str().unwrap().to_string();
    let cookie = format!("jwt={}", token);

    let html = client
        .get(format!("{}/", base))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(html.contains("Ben"));
    assert!(html.contains("Log out"));

    // A broken cookie on a public page just means "not logged in"
    let res = client
        .get(format!("{}/", base))
        .header("cookie", "jwt=garbage")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(format!("{}/me", base)).header("cookie", &cookie).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.text().await.unwrap().contains("ben@example.com"));

    // Plain form submission from the account page
    let res = client
        .post(format!("{}/submit-user-data", base))
        .header("cookie", &cookie)
        .form(&[("name", "Benjamin Hadley"), ("email", "benjamin@example.com")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let html = res.text().await.unwrap();
    assert!(html.contains("Benjamin Hadley"));
    assert!(html.contains("benjamin@example.com"));

    db.drop().await;
}

#[tokio::test]
#[serial]
async fn update_me_stores_resized_photos() {
    let Some(db) = TestDb::create("update_me").await else { return };
    make_rate_limiter_permissive_and_purge().await;

    let public = std::env::temp_dir().join(format!("natours-public-{}", std::process::id()));
    std::fs::create_dir_all(public.join("img/users")).unwrap();

    let user_id = insert_user(&db.pool, "Ben Hadley", "ben@example.com", "test1234", "user").await.unwrap();
    let state = test_state(db.pool.clone(), Arc::new(MemoryMailer::new()), public.to_str().unwrap()).unwrap();
    let base = spawn_app(create_app(state)).await.expect("serve");
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/api/v1/users/login", base))
        .json(&json!({"email": "ben@example.com", "password": "test1234"}))
        .send()
        .await
        .unwrap();
    let token = res.json::<Value>().await.unwrap()["token"].as_str().unwrap().to_string();
    let update_me = format!("{}/api/v1/users/updateMe", base);

    let res = client
        .patch(&update_me)
        .bearer_auth(&token)
        .json(&json!({"password": "newpass123"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        res.json::<Value>().await.unwrap()["message"],
        "This route is not for password updates. Please use /updateMyPassword."
    );

    // Fields other than name and email are ignored
    let res = client
        .patch(&update_me)
        .bearer_auth(&token)
        .json(&json!({"name": "Ben H", "role": "admin"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.json::<Value>().await.unwrap();
    assert_eq!(body["data"]["user"]["name"], "Ben H");
    assert_eq!(body["data"]["user"]["role"], "user");

    // Multipart with a photo
    let mut png = Vec::new();
    image::RgbImage::from_pixel(800, 600, image::Rgb([200, 120, 40]))
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();
    let form = reqwest::multipart::Form::new().text("name", "Ben Hadley").part(
        "photo",
        reqwest::multipart::Part::bytes(png).file_name("me.png").mime_str("image/png").unwrap(),
    );
    let res = client.patch(&update_me).bearer_auth(&token).multipart(form).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.json::<Value>().await.unwrap();
    let photo = body["data"]["user"]["photo"].as_str().unwrap().to_string();
    assert!(photo.starts_with(&format!("user-{}-", user_id)));
    assert!(photo.ends_with(".jpeg"));

    let stored = image::open(public.join("img/users").join(&photo)).unwrap();
    assert_eq!((stored.width(), stored.height()), (500, 500));

    // Non-images are refused
    let form = reqwest::multipart::Form::new().part(
        "photo",
        reqwest::multipart::Part::bytes(b"hello".to_vec()).file_name("notes.txt").mime_str("text/plain").unwrap(),
    );
    let res = client.patch(&update_me).bearer_auth(&token).multipart(form).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.json::<Value>().await.unwrap()["message"], "Not an image! Please upload only images.");

    let _ = std::fs::remove_dir_all(&public);
    db.drop().await;
}
