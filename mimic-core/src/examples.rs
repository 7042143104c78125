//! Example API document exercising every mapping feature.
//!
//! Three routes over a small "items" API:
//! `GET /items/{id}`, `POST /items` and `ANY /files/{path+}`.

use crate::api::ApiSpec;
use crate::error::CoreError;

/// JSON source of the example document.
pub const EXAMPLE_API_JSON: &str = r#"{
  "swagger": "2.0",
  "info": { "title": "items", "version": "1" },
  "paths": {
    "/items/{id}": {
      "parameters": [{ "name": "id", "in": "path", "required": true }],
      "get": {
        "x-amazon-apigateway-integration": {
          "uri": "arn:aws:apigateway:local:lambda:path/2015-03-31/functions/arn:aws:lambda:local:000000000000:function:getItem/invocations",
          "requestTemplates": {
            "application/json": "{\"id\":\"$input.params('id')\",\"stage\":\"$context.stage\"}"
          },
          "responses": {
            "^not found": {
              "statusCode": "404",
              "responseTemplates": {
                "application/json": "{\"message\":\"$input.path('$.errorMessage')\"}"
              }
            },
            "default": {
              "statusCode": "200",
              "responseParameters": {
                "method.response.header.Cache-Control": "'no-store'"
              }
            }
          }
        }
      }
    },
    "/items": {
      "post": {
        "x-amazon-apigateway-integration": {
          "uri": "createItem",
          "requestParameters": {
            "integration.request.header.X-Source": "'mimic'"
          },
          "requestTemplates": {
            "application/json": "{\"item\": $input.json('$'), \"source\": \"$input.params('X-Source')\"}"
          },
          "responses": {
            "default": { "statusCode": "201" }
          }
        }
      }
    },
    "/files/{path+}": {
      "x-amazon-apigateway-any-method": {
        "x-amazon-apigateway-integration": {
          "uri": "readFile",
          "requestTemplates": {
            "application/json": "{\"path\":\"$input.params('path')\",\"method\":\"$context.httpMethod\"}"
          },
          "responses": {
            "default": { "statusCode": "200" }
          }
        }
      }
    }
  }
}"#;

/// Parse [`EXAMPLE_API_JSON`].
///
/// # Errors
/// Only if the embedded document is malformed, which the tests rule out.
pub fn example_api() -> Result<ApiSpec, CoreError> {
    ApiSpec::from_json_str(EXAMPLE_API_JSON)
}
