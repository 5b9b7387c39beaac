//! Stub side of a call: everything after the name checkpoint

use tracing::{debug, warn};

use super::Procedure;
use crate::error::RpcResult;
use crate::network::Transport;
use crate::protocol::{
    block_status, decode_block, encode_block, read_block, write_block, write_status, ExtractError,
    FunctionHeader, StatusCode, WireEncode,
};

/// Sizes of the blocks exchanged by one served call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallReport {
    pub args_len: usize,
    /// `None` for procedures without a result
    pub result_len: Option<usize>,
}

/// Receive and validate the argument block, run the procedure, send the result.
///
/// The argument status is always sent before any local logic runs, and the
/// procedure is never invoked on a block that did not decode exactly. When
/// `fixed` gives the slot sizes of an all-fixed-width signature, the block
/// length is checked against them before any field is decoded.
pub async fn serve_call<P, T>(
    procedure: &P,
    conn: &mut T,
    fixed: Option<&FunctionHeader>,
    max_block_size: usize,
) -> RpcResult<CallReport>
where
    P: Procedure,
    T: Transport + ?Sized,
{
    let block = match read_block(conn, max_block_size).await {
        Ok(block) => block,
        Err(e) => {
            // Tell the proxy what went wrong while it is still listening.
            if let Some(code) = e.code() {
                if !conn.is_eof() {
                    let _ = write_status(conn, code).await;
                }
            }
            return Err(e);
        }
    };

    let decoded = match fixed.map(|header| header.check_block_len(block.len())) {
        Some(StatusCode::TooFewBytes) => Err(ExtractError::Exhausted {
            needed: fixed.map_or(0, |header| header.block_len()),
            remaining: block.len(),
        }),
        Some(StatusCode::TooManyBytes) => Err(ExtractError::Trailing {
            remaining: block.len() - fixed.map_or(0, |header| header.block_len()),
        }),
        _ => decode_block::<P::Args>(&block),
    };
    write_status(conn, block_status(&decoded)).await?;

    let args = match decoded {
        Ok(args) => args,
        Err(e) => {
            warn!("{}: rejected {} argument bytes: {}", P::NAME, block.len(), e);
            return Err(e.into());
        }
    };

    debug!("{}: invoking with {} argument bytes", P::NAME, block.len());
    let output = procedure.invoke(args);

    let result_len = if <P::Output as WireEncode>::VOID {
        None
    } else {
        let result = encode_block(&output);
        write_block(conn, &result).await?;
        Some(result.len())
    };

    Ok(CallReport {
        args_len: block.len(),
        result_len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DEFAULT_MAX_BLOCK_SIZE;
    use crate::rpc::ProcedureInfo;
    use crate::rpc::{Double, Ping};
    use crate::test_util::{word, ScriptedTransport};

    #[tokio::test]
    async fn test_double_stub() {
        let mut input = word(4).to_vec();
        input.extend_from_slice(&word(21));
        let mut conn = ScriptedTransport::new(&input);

        let report = serve_call(&Double, &mut conn, None, DEFAULT_MAX_BLOCK_SIZE).await.unwrap();

        let mut expected = word(StatusCode::GoodBytes.as_u32()).to_vec();
        expected.extend_from_slice(&word(4));
        expected.extend_from_slice(&word(42));
        assert_eq!(conn.written, expected);
        assert_eq!(report, CallReport { args_len: 4, result_len: Some(4) });
    }

    #[tokio::test]
    async fn test_void_procedure_sends_no_result() {
        let mut conn = ScriptedTransport::new(&word(0));

        let report = serve_call(&Ping, &mut conn, None, DEFAULT_MAX_BLOCK_SIZE).await.unwrap();

        assert_eq!(conn.written, word(StatusCode::GoodBytes.as_u32()));
        assert_eq!(report.result_len, None);
    }

    #[tokio::test]
    async fn test_trailing_argument_bytes() {
        let mut input = word(6).to_vec();
        input.extend_from_slice(&[0, 0, 0, 1, 0, 0]);
        let mut conn = ScriptedTransport::new(&input);

        let err = serve_call(&Double, &mut conn, None, DEFAULT_MAX_BLOCK_SIZE).await.unwrap_err();

        assert_eq!(err.code(), Some(StatusCode::TooManyBytes));
        assert_eq!(conn.written, word(StatusCode::TooManyBytes.as_u32()));
    }

    #[tokio::test]
    async fn test_timeout_inside_argument_block() {
        let mut input = word(4).to_vec();
        input.extend_from_slice(&[0, 0]);
        let mut conn = ScriptedTransport::new(&input).stalling();

        let err = serve_call(&Double, &mut conn, None, DEFAULT_MAX_BLOCK_SIZE).await.unwrap_err();

        assert_eq!(err.code(), Some(StatusCode::TimedOut));
        assert!(err.poisons_connection());
        assert_eq!(conn.written, word(StatusCode::TimedOut.as_u32()));
    }

    #[tokio::test]
    async fn test_oversize_argument_block() {
        let mut conn = ScriptedTransport::new(&word(64));

        let err = serve_call(&Double, &mut conn, None, 16).await.unwrap_err();

        assert!(err.poisons_connection());
        assert_eq!(conn.written, word(StatusCode::TooManyBytes.as_u32()));
    }

    #[tokio::test]
    async fn test_short_block_checked_against_fixed_slots() {
        let header = ProcedureInfo::of::<Double>().header();
        let mut input = word(2).to_vec();
        input.extend_from_slice(&[0, 21]);
        let mut conn = ScriptedTransport::new(&input);

        let err = serve_call(&Double, &mut conn, header.as_ref(), DEFAULT_MAX_BLOCK_SIZE)
            .await
            .unwrap_err();

        assert_eq!(err.code(), Some(StatusCode::TooFewBytes));
        assert_eq!(conn.written, word(StatusCode::TooFewBytes.as_u32()));
    }
}
