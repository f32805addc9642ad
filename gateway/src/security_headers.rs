//! 安全响应头中间件

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

const SECURITY_HEADERS: [(&str, &str); 8] = [
    // 强制使用 HTTPS，有效期 1 年，包括子域名
    ("strict-transport-security", "max-age=31536000; includeSubDomains"),
    // 防止页面被嵌入到 iframe 中
    ("x-frame-options", "DENY"),
    // 防止浏览器进行 MIME 类型嗅探
    ("x-content-type-options", "nosniff"),
    ("x-xss-protection", "1; mode=block"),
    // 只返回 JSON，状态推送走 WebSocket
    (
        "content-security-policy",
        "default-src 'none'; connect-src 'self' ws: wss:; frame-ancestors 'none'",
    ),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    ("permissions-policy", "geolocation=(), microphone=(), camera=()"),
    ("cache-control", "no-store"),
];

/// 添加安全响应头的中间件
pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    for (name, value) in SECURITY_HEADERS {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }

    response
}
