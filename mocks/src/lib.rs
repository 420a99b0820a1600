//! Fake face API endpoints for tests, built on `httptest`.

use httptest::{matchers::*, responders::*, Expectation, Server};
use serde_json::{json, Value};

pub const TEST_KEY: &str = "test-key-123";

/// Start an empty fake face API server. Point a client at it with
/// `server.url_str("")`.
pub fn face_api_server() -> Server {
    Server::run()
}

fn service_error(status: u16, code: &str, message: &str) -> impl Responder {
    status_code(status)
        .insert_header("Content-Type", "application/json")
        .body(json!({ "error": { "code": code, "message": message } }).to_string())
}

pub fn face_body(face_id: &str, smile: f64) -> Value {
    json!({
        "faceId": face_id,
        "faceRectangle": { "top": 10, "left": 20, "width": 100, "height": 120 },
        "faceAttributes": { "smile": smile }
    })
}

/// Expect a `POST /detect` carrying an octet-stream body.
pub fn expect_detect(server: &Server, faces: Value) {
    server.expect(
        Expectation::matching(all_of![
            request::method_path("POST", "/detect"),
            request::query(url_decoded(contains(("returnFaceId", "true")))),
            request::headers(contains(("content-type", "application/octet-stream"))),
            request::headers(contains(("ocp-apim-subscription-key", TEST_KEY))),
        ])
        .respond_with(json_encoded(faces)),
    );
}

pub fn expect_identify(server: &Server, group_id: &str, face_ids: &[&str], results: Value) {
    server.expect(
        Expectation::matching(all_of![
            request::method_path("POST", "/identify"),
            request::body(json_decoded(eq(json!({
                "personGroupId": group_id,
                "faceIds": face_ids,
            })))),
        ])
        .respond_with(json_encoded(results)),
    );
}

pub fn expect_group_found(server: &Server, group_id: &str) {
    server.expect(
        Expectation::matching(request::method_path(
            "GET",
            eq(format!("/persongroups/{}", group_id)),
        ))
        .respond_with(json_encoded(json!({
            "personGroupId": group_id,
            "name": group_id,
            "userData": null
        }))),
    );
}

pub fn expect_group_missing(server: &Server, group_id: &str) {
    server.expect(
        Expectation::matching(request::method_path(
            "GET",
            eq(format!("/persongroups/{}", group_id)),
        ))
        .respond_with(service_error(
            404,
            "PersonGroupNotFound",
            "Person group is not found.",
        )),
    );
}

pub fn expect_group_unauthorized(server: &Server, group_id: &str) {
    server.expect(
        Expectation::matching(request::method_path(
            "GET",
            eq(format!("/persongroups/{}", group_id)),
        ))
        .respond_with(service_error(
            401,
            "Unspecified",
            "Access denied due to invalid subscription key.",
        )),
    );
}

/// Expect a `PUT /persongroups/{id}` that names the group after its id.
/// The service answers with an empty body.
pub fn expect_create_group(server: &Server, group_id: &str) {
    server.expect(
        Expectation::matching(all_of![
            request::method_path("PUT", eq(format!("/persongroups/{}", group_id))),
            request::body(json_decoded(eq(json!({ "name": group_id })))),
        ])
        .respond_with(status_code(200)),
    );
}

pub fn expect_list_persons(server: &Server, group_id: &str, persons: Value) {
    server.expect(
        Expectation::matching(request::method_path(
            "GET",
            eq(format!("/persongroups/{}/persons", group_id)),
        ))
        .respond_with(json_encoded(persons)),
    );
}

pub fn expect_create_person(server: &Server, group_id: &str, person_id: &str) {
    server.expect(
        Expectation::matching(request::method_path(
            "POST",
            eq(format!("/persongroups/{}/persons", group_id)),
        ))
        .respond_with(json_encoded(json!({ "personId": person_id }))),
    );
}

pub fn expect_delete_person(server: &Server, group_id: &str, person_id: &str) {
    server.expect(
        Expectation::matching(request::method_path(
            "DELETE",
            eq(format!("/persongroups/{}/persons/{}", group_id, person_id)),
        ))
        .respond_with(status_code(200)),
    );
}

pub fn expect_add_face(server: &Server, group_id: &str, person_id: &str, persisted_face_id: &str) {
    server.expect(
        Expectation::matching(all_of![
            request::method_path(
                "POST",
                eq(format!("/persongroups/{}/persons/{}/persistedFaces", group_id, person_id)),
            ),
            request::headers(contains(("content-type", "application/octet-stream"))),
        ])
        .respond_with(json_encoded(json!({ "persistedFaceId": persisted_face_id }))),
    );
}

/// Like [`expect_add_face`], but also requires `targetFace` to be `target`
/// (`left,top,width,height`).
pub fn expect_add_face_at(
    server: &Server,
    group_id: &str,
    person_id: &str,
    target: &str,
    persisted_face_id: &str,
) {
    server.expect(
        Expectation::matching(all_of![
            request::method_path(
                "POST",
                eq(format!("/persongroups/{}/persons/{}/persistedFaces", group_id, person_id)),
            ),
            request::query(url_decoded(contains(("targetFace", eq(target.to_string()))))),
        ])
        .respond_with(json_encoded(json!({ "persistedFaceId": persisted_face_id }))),
    );
}

/// Training is accepted with `202` and an empty body.
pub fn expect_train(server: &Server, group_id: &str) {
    server.expect(
        Expectation::matching(request::method_path(
            "POST",
            eq(format!("/persongroups/{}/train", group_id)),
        ))
        .respond_with(status_code(202)),
    );
}

pub fn expect_training_status(server: &Server, group_id: &str, status: &str) {
    server.expect(
        Expectation::matching(request::method_path(
            "GET",
            eq(format!("/persongroups/{}/training", group_id)),
        ))
        .respond_with(json_encoded(json!({
            "status": status,
            "createdDateTime": "2026-10-01T12:00:00Z",
            "lastActionDateTime": "2026-10-01T12:00:05Z",
            "message": null
        }))),
    );
}
