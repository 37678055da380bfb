// SPDX-License-Identifier: Apache-2.0

use serde_json::{json, Value};

/// The served route registry. `docs/contracts/ENDPOINTS.json` is a checked-in
/// copy of this value; the contract test keeps the two and the router source
/// from drifting apart. `auth` is `session` when the guard middleware must
/// hold a live session before the handler runs.
#[must_use]
pub fn endpoints_v1() -> Value {
    json!({
      "endpoints": [
        {"method": "GET",    "path": "/",                                        "auth": "open"},
        {"method": "POST",   "path": "/login",                                   "auth": "open"},
        {"method": "POST",   "path": "/register",                                "auth": "open"},
        {"method": "PUT",    "path": "/logout",                                  "auth": "open"},
        {"method": "POST",   "path": "/auth/googleRegister",                     "auth": "open"},
        {"method": "POST",   "path": "/linkThirdPartyUser",                      "auth": "session"},
        {"method": "DELETE", "path": "/unlinkThirdPartyUser",                    "auth": "session"},
        {"method": "POST",   "path": "/article",                                 "auth": "session"},
        {"method": "GET",    "path": "/articles",                                "auth": "session"},
        {"method": "GET",    "path": "/articles/{id}",                           "auth": "session"},
        {"method": "PUT",    "path": "/articles/{id}",                           "auth": "session"},
        {"method": "GET",    "path": "/getCommentAuthor/{articleId}/{commentId}", "auth": "session"},
        {"method": "GET",    "path": "/headline",                                "auth": "session"},
        {"method": "GET",    "path": "/headline/{user}",                         "auth": "session"},
        {"method": "PUT",    "path": "/headline",                                "auth": "session"},
        {"method": "GET",    "path": "/email",                                   "auth": "session"},
        {"method": "GET",    "path": "/email/{user}",                            "auth": "session"},
        {"method": "PUT",    "path": "/email",                                   "auth": "session"},
        {"method": "GET",    "path": "/zipcode",                                 "auth": "session"},
        {"method": "GET",    "path": "/zipcode/{user}",                          "auth": "session"},
        {"method": "PUT",    "path": "/zipcode",                                 "auth": "session"},
        {"method": "GET",    "path": "/phone",                                   "auth": "session"},
        {"method": "GET",    "path": "/phone/{user}",                            "auth": "session"},
        {"method": "PUT",    "path": "/phone",                                   "auth": "session"},
        {"method": "GET",    "path": "/dob",                                     "auth": "session"},
        {"method": "GET",    "path": "/dob/{user}",                              "auth": "session"},
        {"method": "GET",    "path": "/avatar",                                  "auth": "session"},
        {"method": "GET",    "path": "/avatar/{user}",                           "auth": "session"},
        {"method": "PUT",    "path": "/avatar",                                  "auth": "session"},
        {"method": "PUT",    "path": "/password",                                "auth": "session"},
        {"method": "GET",    "path": "/following",                               "auth": "session"},
        {"method": "GET",    "path": "/following/{user}",                        "auth": "session"},
        {"method": "PUT",    "path": "/following/{user}",                        "auth": "session"},
        {"method": "DELETE", "path": "/following/{user}",                        "auth": "session"},
        {"method": "GET",    "path": "/media/{id}",                              "auth": "open"},
        {"method": "GET",    "path": "/healthz",                                 "auth": "open"},
        {"method": "GET",    "path": "/readyz",                                  "auth": "open"},
        {"method": "GET",    "path": "/version",                                 "auth": "open"},
        {"method": "GET",    "path": "/metrics",                                 "auth": "open"}
      ]
    })
}
