// Copyright 2025-2026 CloudSnooze Contributors
// SPDX-License-Identifier: Apache-2.0

//! Minimal AWS Signature Version 4 signer.
//!
//! Covers exactly what the EC2 query API needs: a fixed header set
//! (content-type, host, x-amz-date, optionally x-amz-security-token) and a
//! form-encoded or empty body. Not a general-purpose signer.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Credentials resolved from the instance role.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

/// One request to sign.
pub struct SigningRequest<'a> {
    pub method: &'a str,
    /// Canonical URI path, usually "/".
    pub uri: &'a str,
    /// Canonical (already encoded and sorted) query string, may be empty.
    pub query: &'a str,
    pub host: &'a str,
    pub content_type: &'a str,
    /// `YYYYMMDDTHHMMSSZ`.
    pub amz_date: &'a str,
    pub region: &'a str,
    pub service: &'a str,
    pub body: &'a [u8],
}

/// Compute the `Authorization` header value for `request`.
pub fn authorization_header(creds: &Credentials, request: &SigningRequest<'_>) -> String {
    let date = &request.amz_date[..8];
    let scope = format!("{}/{}/{}/aws4_request", date, request.region, request.service);

    let mut canonical_headers = format!(
        "content-type:{}\nhost:{}\nx-amz-date:{}\n",
        request.content_type, request.host, request.amz_date
    );
    let mut signed_headers = "content-type;host;x-amz-date".to_string();
    if let Some(token) = &creds.session_token {
        canonical_headers.push_str(&format!("x-amz-security-token:{}\n", token));
        signed_headers.push_str(";x-amz-security-token");
    }

    let payload_hash = hex::encode(Sha256::digest(request.body));
    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method, request.uri, request.query, canonical_headers, signed_headers, payload_hash
    );

    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        request.amz_date,
        scope,
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let k_date = hmac(
        format!("AWS4{}", creds.secret_access_key).as_bytes(),
        date.as_bytes(),
    );
    let k_region = hmac(&k_date, request.region.as_bytes());
    let k_service = hmac(&k_region, request.service.as_bytes());
    let k_signing = hmac(&k_service, b"aws4_request");
    let signature = hex::encode(hmac(&k_signing, string_to_sign.as_bytes()));

    format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        creds.access_key_id, scope, signed_headers, signature
    )
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key)
        .unwrap_or_else(|_| unreachable!("hmac accepts any key length"));
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Percent-encode per SigV4 rules: unreserved characters pass through,
/// everything else becomes `%XX`.
pub fn aws_urlencode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Encode key/value pairs as a form body in the given order.
pub fn form_encode(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", aws_urlencode(k), aws_urlencode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    // The worked example from the AWS SigV4 documentation: GET
    // iam.amazonaws.com/?Action=ListUsers&Version=2010-05-08 at
    // 20150830T123600Z with the published example credentials.
    #[test]
    fn test_documented_iam_example_signature() {
        let creds = Credentials {
            access_key_id: "AKIDEXAMPLE".into(),
            secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".into(),
            session_token: None,
        };
        let request = SigningRequest {
            method: "GET",
            uri: "/",
            query: "Action=ListUsers&Version=2010-05-08",
            host: "iam.amazonaws.com",
            content_type: "application/x-www-form-urlencoded; charset=utf-8",
            amz_date: "20150830T123600Z",
            region: "us-east-1",
            service: "iam",
            body: b"",
        };

        let header = authorization_header(&creds, &request);
        assert_eq!(
            header,
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/iam/aws4_request, \
             SignedHeaders=content-type;host;x-amz-date, \
             Signature=5d672d79c15b13162d9279b0855cfba6789a8edb4c82c400e06b5924a6f2b5d7"
        );
    }

    #[test]
    fn test_session_token_joins_signed_headers() {
        let creds = Credentials {
            access_key_id: "AKID".into(),
            secret_access_key: "secret".into(),
            session_token: Some("TOKEN".into()),
        };
        let request = SigningRequest {
            method: "POST",
            uri: "/",
            query: "",
            host: "ec2.us-east-1.amazonaws.com",
            content_type: "application/x-www-form-urlencoded; charset=utf-8",
            amz_date: "20240101T000000Z",
            region: "us-east-1",
            service: "ec2",
            body: b"Action=StopInstances",
        };

        let header = authorization_header(&creds, &request);
        assert!(header.contains("x-amz-security-token"));
        assert!(header.contains("/20240101/us-east-1/ec2/aws4_request"));
    }

    #[test]
    fn test_signature_is_hex_sha256_sized() {
        let creds = Credentials {
            access_key_id: "AKID".into(),
            secret_access_key: "secret".into(),
            session_token: None,
        };
        let request = SigningRequest {
            method: "POST",
            uri: "/",
            query: "",
            host: "ec2.us-east-1.amazonaws.com",
            content_type: "application/x-www-form-urlencoded; charset=utf-8",
            amz_date: "20240101T000000Z",
            region: "us-east-1",
            service: "ec2",
            body: b"x",
        };
        let header = authorization_header(&creds, &request);
        let signature = header.rsplit("Signature=").next().unwrap();
        assert_eq!(signature.len(), 64);
        assert!(signature.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn test_urlencode_unreserved_passthrough() {
        assert_eq!(aws_urlencode("AZaz09-_.~"), "AZaz09-_.~");
    }

    #[test]
    fn test_urlencode_reserved() {
        assert_eq!(aws_urlencode("a b/c=d&e"), "a%20b%2Fc%3Dd%26e");
        assert_eq!(aws_urlencode("CloudSnooze/Reason"), "CloudSnooze%2FReason");
    }

    #[test]
    fn test_form_encode_preserves_order() {
        let body = form_encode(&[
            ("Action".into(), "CreateTags".into()),
            ("Tag.1.Key".into(), "CloudSnooze/Reason".into()),
            ("Tag.1.Value".into(), "idle for 60s".into()),
        ]);
        assert_eq!(
            body,
            "Action=CreateTags&Tag.1.Key=CloudSnooze%2FReason&Tag.1.Value=idle%20for%2060s"
        );
    }
}
