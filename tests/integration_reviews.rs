use std::sync::Arc;

use natours::create_app;
use natours::test_helpers::{
    PUBLIC_DIR, TestDb, insert_tour, insert_user, make_rate_limiter_permissive_and_purge, spawn_app, test_state,
};
use natours::utils::email::MemoryMailer;
use reqwest::StatusCode;
use serde_json::{Value, json};
use serial_test::serial;

async fn json_of(res: reqwest::Response) -> Value {
    res.json().await.expect("json body")
}

async fn login(client: &reqwest::Client, base: &str, email: &str) -> String {
    let res = client
        .post(format!("{}/api/v1/users/login", base))
        .json(&json!({"email": email, "password": "test1234"}))
        .send()
        .await
        .unwrap();
    json_of(res).await["token"].as_str().unwrap().to_string()
}

/// `(ratingsQuantity, ratingsAverage)` as the API reports them.
async fn ratings(client: &reqwest::Client, base: &str, tour_id: i64) -> (i64, f64) {
    let body = json_of(client.get(format!("{}/api/v1/tours/{}", base, tour_id)).send().await.unwrap()).await;
    let doc = &body["data"]["data"];
    (doc["ratingsQuantity"].as_i64().unwrap(), doc["ratingsAverage"].as_f64().unwrap())
}

#[tokio::test]
#[serial]
async fn reviews_keep_tour_ratings_in_sync() {
    let Some(db) = TestDb::create("reviews").await else { return };
    make_rate_limiter_permissive_and_purge().await;

    let pool = &db.pool;
    insert_user(pool, "Admin", "admin@example.com", "test1234", "admin").await.unwrap();
    let ben_id = insert_user(pool, "Ben Hadley", "ben@example.com", "test1234", "user").await.unwrap();
    insert_user(pool, "Laura Wilson", "laura@example.com", "test1234", "user").await.unwrap();
    let tour_id = insert_tour(pool, "The Forest Hiker", 397.0).await.unwrap();

    let state = test_state(db.pool.clone(), Arc::new(MemoryMailer::new()), PUBLIC_DIR).unwrap();
    let base = spawn_app(create_app(state)).await.expect("serve");
    let client = reqwest::Client::new();

    let admin = login(&client, &base, "admin@example.com").await;
    let ben = login(&client, &base, "ben@example.com").await;
    let laura = login(&client, &base, "laura@example.com").await;

    assert_eq!(ratings(&client, &base, tour_id).await, (0, 4.5));

    // Nested route fills in tour and user
    let nested = format!("{}/api/v1/tours/{}/reviews", base, tour_id);
    let res = client
        .post(&nested)
        .bearer_auth(&ben)
        .json(&json!({"review": "Loved every minute", "rating": 5}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let ben_review = json_of(res).await["data"]["data"].clone();
    assert_eq!(ben_review["tour"], tour_id);
    assert_eq!(ben_review["user"]["id"], ben_id);
    assert_eq!(ratings(&client, &base, tour_id).await, (1, 5.0));

    // One review per user and tour
    let res = client
        .post(&nested)
        .bearer_auth(&ben)
        .json(&json!({"review": "Once more", "rating": 1}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(json_of(res).await["message"].as_str().unwrap().starts_with("Duplicate field value"));

    // Only regular users write reviews
    let res = client
        .post(&nested)
        .bearer_auth(&admin)
        .json(&json!({"review": "Admin opinion", "rating": 3}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .post(format!("{}/api/v1/reviews", base))
        .bearer_auth(&laura)
        .json(&json!({"review": "Great guides", "rating": 6, "tour": tour_id}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(json_of(res).await["message"].as_str().unwrap().contains("Rating must be between 1 and 5"));

    let res = client
        .post(format!("{}/api/v1/reviews", base))
        .bearer_auth(&laura)
        .json(&json!({"review": "Great guides", "rating": 4, "tour": 999_999}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_of(res).await["message"], "No tour found with that ID");

    let res = client
        .post(format!("{}/api/v1/reviews", base))
        .bearer_auth(&laura)
        .json(&json!({"review": "Great guides", "rating": 4, "tour": tour_id}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let laura_review = json_of(res).await["data"]["data"]["id"].as_i64().unwrap();
    assert_eq!(ratings(&client, &base, tour_id).await, (2, 4.5));

    // Listing
    let res = client.get(&nested).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body = json_of(client.get(&nested).bearer_auth(&laura).send().await.unwrap()).await;
    assert_eq!(body["results"], 2);
    let body = json_of(
        client
            .get(format!("{}/api/v1/reviews?rating[gte]=5", base))
            .bearer_auth(&laura)
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["results"], 1);
    assert_eq!(body["data"]["data"][0]["user"]["name"], "Ben Hadley");

    // The tour page embeds its reviews
    let body = json_of(client.get(format!("{}/api/v1/tours/{}", base, tour_id)).send().await.unwrap()).await;
    assert_eq!(body["data"]["data"]["reviews"].as_array().unwrap().len(), 2);

    // Updates and deletes recalculate
    let ben_review_id = ben_review["id"].as_i64().unwrap();
    let res = client
        .patch(format!("{}/api/v1/reviews/{}", base, ben_review_id))
        .bearer_auth(&ben)
        .json(&json!({"rating": 2}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(ratings(&client, &base, tour_id).await, (2, 3.0));

    let res = client
        .delete(format!("{}/api/v1/reviews/{}", base, laura_review))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(ratings(&client, &base, tour_id).await, (1, 2.0));

    let res = client
        .delete(format!("{}/api/v1/reviews/{}", base, ben_review_id))
        .bearer_auth(&ben)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(ratings(&client, &base, tour_id).await, (0, 4.5));

    db.drop().await;
}
