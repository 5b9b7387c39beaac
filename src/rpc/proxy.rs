//! Proxy side of a call

use bytes::Bytes;
use tracing::debug;

use super::Signature;
use crate::error::{RpcError, RpcResult};
use crate::network::Transport;
use crate::protocol::{
    decode_block, expect_status, read_block, write_block, write_name_frame, BlockEncoder,
    Checkpoint, FunctionHeader, StatusCode, WireEncode, TERMINATOR,
};

/// Run one call with an already-encoded argument block.
///
/// Returns the raw result block when `expects_result` is set. Nothing past a
/// checkpoint is sent until the stub has accepted it.
pub async fn call_raw<T: Transport + ?Sized>(
    conn: &mut T,
    name: &str,
    args: &[u8],
    expects_result: bool,
    max_block_size: usize,
) -> RpcResult<Option<Bytes>> {
    if name.as_bytes().contains(&TERMINATOR) {
        return Err(RpcError::protocol(
            StatusCode::ScrambledBytes,
            format!("function name {:?} contains a terminator byte", name),
        ));
    }

    write_name_frame(conn, name).await?;
    expect_status(conn, Checkpoint::Name, StatusCode::ExistingFunction).await?;

    write_block(conn, args).await?;
    expect_status(conn, Checkpoint::Arguments, StatusCode::GoodBytes).await?;

    if !expects_result {
        return Ok(None);
    }
    let result = read_block(conn, max_block_size).await?;
    Ok(Some(result))
}

/// Call the remote procedure described by `S`
pub async fn call<S, T>(conn: &mut T, args: &S::Args, max_block_size: usize) -> RpcResult<S::Output>
where
    S: Signature,
    T: Transport + ?Sized,
{
    let mut enc = BlockEncoder::new();
    let mut arg_sizes = Vec::new();
    args.encode_slots(&mut enc, &mut arg_sizes);
    let header = FunctionHeader::new(S::NAME, arg_sizes);
    let block = enc.finish();
    debug!("calling {}() with argument slots {:?}", header.name, header.arg_sizes);

    let expects_result = !<S::Output as WireEncode>::VOID;
    let result = call_raw(conn, &header.name, &block, expects_result, max_block_size).await?;

    let result = result.unwrap_or_default();
    decode_block::<S::Output>(&result).map_err(|e| {
        RpcError::protocol(e.status(), format!("{}: bad result block: {}", S::NAME, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DEFAULT_MAX_BLOCK_SIZE;
    use crate::rpc::{Add, Double, Greet, Ping};
    use crate::test_util::{name_frame, word, ScriptedTransport};

    fn status(code: StatusCode) -> [u8; 4] {
        word(code.as_u32())
    }

    #[tokio::test]
    async fn test_double_proxy_bytes() {
        let mut replies = status(StatusCode::ExistingFunction).to_vec();
        replies.extend_from_slice(&status(StatusCode::GoodBytes));
        replies.extend_from_slice(&word(4));
        replies.extend_from_slice(&word(42));
        let mut conn = ScriptedTransport::new(&replies);

        let out = call::<Double, _>(&mut conn, &21, DEFAULT_MAX_BLOCK_SIZE).await.unwrap();

        assert_eq!(out, 42);
        let mut sent = name_frame("double");
        sent.extend_from_slice(&word(4));
        sent.extend_from_slice(&word(21));
        assert_eq!(conn.written, sent);
    }

    #[tokio::test]
    async fn test_unknown_function_stops_after_name() {
        let mut conn = ScriptedTransport::new(&status(StatusCode::NonexistentFunction));

        let err = call::<Add, _>(&mut conn, &(1, 2), DEFAULT_MAX_BLOCK_SIZE).await.unwrap_err();

        assert!(matches!(
            err,
            RpcError::Rejected { checkpoint: Checkpoint::Name, code: StatusCode::NonexistentFunction }
        ));
        assert!(!err.poisons_connection());
        // No argument bytes went out.
        assert_eq!(conn.written, name_frame("add"));
    }

    #[tokio::test]
    async fn test_arguments_refused() {
        let mut replies = status(StatusCode::ExistingFunction).to_vec();
        replies.extend_from_slice(&status(StatusCode::ScrambledBytes));
        let mut conn = ScriptedTransport::new(&replies);

        let err = call::<Greet, _>(&mut conn, &"bob".to_string(), DEFAULT_MAX_BLOCK_SIZE)
            .await
            .unwrap_err();

        assert_eq!(err.code(), Some(StatusCode::ScrambledBytes));
    }

    #[tokio::test]
    async fn test_result_with_trailing_bytes() {
        let mut replies = status(StatusCode::ExistingFunction).to_vec();
        replies.extend_from_slice(&status(StatusCode::GoodBytes));
        replies.extend_from_slice(&word(5));
        replies.extend_from_slice(&[0, 0, 0, 42, 9]);
        let mut conn = ScriptedTransport::new(&replies);

        let err = call::<Double, _>(&mut conn, &21, DEFAULT_MAX_BLOCK_SIZE).await.unwrap_err();

        assert_eq!(err.code(), Some(StatusCode::TooManyBytes));
        assert!(!err.poisons_connection());
    }

    #[tokio::test]
    async fn test_void_call_reads_no_result() {
        let mut replies = status(StatusCode::ExistingFunction).to_vec();
        replies.extend_from_slice(&status(StatusCode::GoodBytes));
        let mut conn = ScriptedTransport::new(&replies);

        call::<Ping, _>(&mut conn, &(), DEFAULT_MAX_BLOCK_SIZE).await.unwrap();

        let mut sent = name_frame("ping");
        sent.extend_from_slice(&word(0));
        assert_eq!(conn.written, sent);
        assert!(!conn.is_eof());
    }

    #[tokio::test]
    async fn test_name_with_terminator_is_refused() {
        let mut conn = ScriptedTransport::closed();
        let err = call_raw(&mut conn, "a\0b", &[], false, 16).await.unwrap_err();

        assert_eq!(err.code(), Some(StatusCode::ScrambledBytes));
        assert_eq!(conn.writes, 0);
    }
}
