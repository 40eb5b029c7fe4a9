use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};

use marketplace_cart::session::{Claims, Session};

fn token(sub: &str, expires_in: i64) -> anyhow::Result<String> {
    let claims = Claims {
        sub: sub.to_string(),
        exp: (Utc::now().timestamp() + expires_in) as usize,
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"server-side-secret"),
    )?)
}

#[test]
fn live_token_means_server_cart() -> anyhow::Result<()> {
    let raw = token("buyer-42", 3600)?;
    let session = Session::from_token(Some(&raw));
    assert!(session.is_authenticated());
    assert_eq!(session.token(), Some(raw.as_str()));
    assert!(matches!(session, Session::Authenticated { ref buyer_id, .. } if buyer_id == "buyer-42"));
    Ok(())
}

#[test]
fn bearer_prefix_is_accepted() -> anyhow::Result<()> {
    let raw = token("buyer-7", 3600)?;
    let session = Session::from_token(Some(&format!("Bearer {raw}")));
    assert_eq!(session.token(), Some(raw.as_str()));
    Ok(())
}

#[test]
fn anything_else_is_a_guest() -> anyhow::Result<()> {
    assert_eq!(Session::from_token(None), Session::Guest);
    assert_eq!(Session::from_token(Some("  ")), Session::Guest);
    assert_eq!(Session::from_token(Some("not-a-jwt")), Session::Guest);

    let expired = token("buyer-42", -3600)?;
    assert_eq!(Session::from_token(Some(&expired)), Session::Guest);
    assert_eq!(Session::Guest.token(), None);
    Ok(())
}
