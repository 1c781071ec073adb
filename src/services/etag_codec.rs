//! Text encoding of [`UploadSessionToken`].
//!
//! Format: `<uploadId>|<partNumber>,<eTag>[,<partNumber>,<eTag>]*`. A session
//! that has been initiated but holds no parts encodes as `<uploadId>|`.
//! Callers pass the string between chunk calls and must treat it as opaque.

use crate::{
    errors::TokenError,
    models::multipart::{FIELD_SEPARATOR, PartDescriptor, UPLOAD_ID_SEPARATOR, UploadSessionToken},
};

pub fn encode(token: &UploadSessionToken) -> String {
    let mut out = String::with_capacity(token.upload_id().len() + 1 + token.parts().len() * 40);
    out.push_str(token.upload_id());
    out.push(UPLOAD_ID_SEPARATOR);
    for (idx, part) in token.parts().iter().enumerate() {
        if idx > 0 {
            out.push(FIELD_SEPARATOR);
        }
        out.push_str(&part.part_number.to_string());
        out.push(FIELD_SEPARATOR);
        out.push_str(&part.e_tag);
    }
    out
}

/// Parse a token produced by [`encode`].
///
/// Either the whole token is valid or nothing is returned; part ordering is
/// left to the completion check.
pub fn decode(input: &str) -> Result<UploadSessionToken, TokenError> {
    let (upload_id, fields) = input
        .split_once(UPLOAD_ID_SEPARATOR)
        .ok_or(TokenError::MissingSeparator)?;
    let mut token = UploadSessionToken::new(upload_id)?;
    if fields.is_empty() {
        return Ok(token);
    }

    let fields: Vec<&str> = fields.split(FIELD_SEPARATOR).collect();
    if fields.len() % 2 != 0 {
        return Err(TokenError::OddFieldCount(fields.len()));
    }

    for pair in fields.chunks_exact(2) {
        let part_number = pair[0]
            .parse::<u32>()
            .map_err(|_| TokenError::InvalidPartNumber(pair[0].to_string()))?;
        token.push(PartDescriptor::new(part_number, pair[1])?);
    }
    Ok(token)
}
