//! Salt API response decoding.
//!
//! Every answer is first turned into a generic JSON tree by
//! [`decode_body`]; the `extract_*` functions then pull one typed value
//! out of that tree. Each failure names the path that was expected and
//! embeds the offending tree, so a bad answer can be diagnosed from the
//! error alone.

use reqwest::{Method, Response, StatusCode};
use saltjob_models::{
    AuthToken, CommandEntry, LoginEntry, NodeOutcome, PollEntry, StateOutcome, SubmitEntry,
    STATE_SLS,
};
use serde::Deserialize;
use serde_json::Value;

use crate::error::SaltError;

/// Reason returned when every failed state only failed because of another.
pub const ROOT_CAUSE_NOT_FOUND: &str = "state failed, root cause not found";

/// Comment prefix of a state that failed because one of its requisites did.
const REQUISITE_FAILED_PREFIX: &str = "One or more requisite failed";

/// Read a response body and decode it with [`decode_body`].
pub(crate) async fn decode_api_response(
    response: Response,
    verb: &Method,
    endpoint: &str,
) -> Result<Value, SaltError> {
    let endpoint = format!("/{endpoint}");
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|source| SaltError::Transport {
            verb: verb.to_string(),
            endpoint: endpoint.clone(),
            source,
        })?;
    decode_body(&endpoint, status, &body)
}

/// Turn a status and raw body received from `endpoint` into a JSON tree.
///
/// Any status other than 200 is an [`SaltError::Api`] carrying the body
/// verbatim; the server may answer errors with HTML, so no JSON decoding is
/// attempted in that case. A 200 body that is not JSON is a decode error,
/// never an empty result.
pub fn decode_body(endpoint: &str, status: StatusCode, body: &[u8]) -> Result<Value, SaltError> {
    if status != StatusCode::OK {
        return Err(SaltError::Api {
            endpoint: endpoint.to_string(),
            status,
            body: String::from_utf8_lossy(body).into_owned(),
        });
    }
    serde_json::from_slice(body).map_err(|e| {
        SaltError::decode(
            "$",
            format!(
                "body of {endpoint} is not valid JSON ({e}): {}",
                String::from_utf8_lossy(body)
            ),
        )
    })
}

/// Job id of an asynchronous submission, from `return[0].jid`.
pub fn extract_jid(tree: &Value) -> Result<String, SaltError> {
    let entry: SubmitEntry = typed(single_entry(tree, "return")?, "return[0]")?;
    Ok(entry.jid)
}

/// Session token from a login answer, from `return[0].token` and
/// `return[0].expire`.
pub fn extract_token(tree: &Value) -> Result<AuthToken, SaltError> {
    let entry: LoginEntry = typed(single_entry(tree, "return")?, "return[0]")?;
    Ok(AuthToken::from_epoch_seconds(entry.token, entry.expire)?)
}

/// Device name from a synchronous command answer, from
/// `return[0].<node>`.
///
/// A node reporting `success: false` turns into
/// [`SaltError::CommandFailed`] whose message is the node's `result`.
pub fn extract_device_name(tree: &Value, node: &str) -> Result<String, SaltError> {
    let entry = single_entry(tree, "return")?;
    let path = format!("return[0].{node}");
    let answer = entry
        .get(node)
        .ok_or_else(|| SaltError::decode(&path, format!("no answer from node in {tree}")))?;
    let command: CommandEntry = typed(answer, &path)?;
    if command.success {
        Ok(command.result)
    } else {
        Err(SaltError::CommandFailed {
            node: node.to_string(),
            message: command.result,
        })
    }
}

/// Interpret a job lookup answer for one node.
///
/// * `Ok(None)`: the job is still running, poll again later.
/// * `Ok(Some(payload))`: the job succeeded; `payload` is the node's
///   `return` value, unchanged.
/// * `Err(..)`: the job is unknown, failed, or the answer is malformed.
///   Decode errors name the job id.
pub fn parse_poll_answer(tree: &Value, jid: &str, node: &str) -> Result<Option<Value>, SaltError> {
    poll_outcome(tree, jid, node).map_err(|e| match e {
        SaltError::Decode { path, detail } => SaltError::Decode {
            path,
            detail: format!("job {jid}: {detail}"),
        },
        other => other,
    })
}

fn poll_outcome(tree: &Value, jid: &str, node: &str) -> Result<Option<Value>, SaltError> {
    let entry: PollEntry = typed(single_entry(tree, "info")?, "info[0]")?;

    if let Some(reason) = entry.error {
        return Err(SaltError::JobNotFound {
            jid: jid.to_string(),
            reason,
        });
    }

    let function = entry
        .function
        .ok_or_else(|| SaltError::decode("info[0].Function", format!("missing in {tree}")))?;
    let results = entry
        .result
        .ok_or_else(|| SaltError::decode("info[0].Result", format!("missing in {tree}")))?;

    if results.is_empty() {
        return Ok(None);
    }

    let path = format!("info[0].Result.{node}");
    let answer = results
        .get(node)
        .ok_or_else(|| SaltError::decode(&path, format!("no result for node in {tree}")))?;
    let outcome: NodeOutcome = typed(answer, &path)?;

    match outcome.retcode {
        0 => Ok(Some(outcome.output)),
        1 if function == STATE_SLS => Err(SaltError::JobFailedToRun {
            jid: jid.to_string(),
            node: node.to_string(),
            reason: describe_output(&outcome.output),
        }),
        _ => Err(SaltError::JobFailed {
            jid: jid.to_string(),
            node: node.to_string(),
            reason: state_failure_root_cause(&outcome.output),
        }),
    }
}

/// Find the comment of the state that actually caused a failure.
///
/// `output` is either a plain message, returned as is, or a map of state
/// results. Failed states whose comment says a requisite failed are
/// consequences, not causes, and are skipped. States are visited in run
/// order when the node reports one.
pub fn state_failure_root_cause(output: &Value) -> String {
    match output {
        Value::String(message) => message.clone(),
        Value::Object(states) => {
            let mut failed: Vec<StateOutcome> = states
                .values()
                .filter_map(|state| StateOutcome::deserialize(state).ok())
                .filter(|state| state.result == Some(false))
                .collect();
            failed.sort_by_key(|state| state.run_num.unwrap_or(u64::MAX));
            failed
                .into_iter()
                .find(|state| !state.comment.starts_with(REQUISITE_FAILED_PREFIX))
                .map_or_else(|| ROOT_CAUSE_NOT_FOUND.to_string(), |state| state.comment)
        }
        other => format!("unexpected state output of type {}", json_type(other)),
    }
}

/// The single element of `tree.<key>`.
fn single_entry<'a>(tree: &'a Value, key: &str) -> Result<&'a Value, SaltError> {
    match tree.get(key).and_then(Value::as_array).map(Vec::as_slice) {
        Some([entry]) => Ok(entry),
        _ => Err(SaltError::decode(
            format!("{key}[0]"),
            format!("expected a single-element `{key}` array in {tree}"),
        )),
    }
}

fn typed<'a, T: Deserialize<'a>>(value: &'a Value, path: &str) -> Result<T, SaltError> {
    T::deserialize(value).map_err(|e| SaltError::decode(path, format!("{e} in {value}")))
}

/// Render output of a job that never ran, usually a list of messages.
fn describe_output(output: &Value) -> String {
    match output {
        Value::String(message) => message.clone(),
        Value::Array(lines) if lines.iter().all(Value::is_string) => lines
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // -- decode_body ---------------------------------------------------------

    #[test]
    fn non_200_embeds_status_and_raw_body() {
        let err = decode_body("/jobs/1", StatusCode::UNAUTHORIZED, b"error").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Salt API failed with code 401"), "{msg}");
        assert!(msg.contains("/jobs/1"), "{msg}");
        assert!(msg.contains("error"));
        assert!(matches!(err, SaltError::Api { body, .. } if body == "error"));
    }

    #[test]
    fn non_200_html_is_not_parsed() {
        let err = decode_body("/jobs/1", StatusCode::INTERNAL_SERVER_ERROR, b"<html>oops</html>").unwrap_err();
        assert!(matches!(err, SaltError::Api { body, .. } if body == "<html>oops</html>"));
    }

    #[test]
    fn html_with_200_is_a_decode_error() {
        let err = decode_body("/jobs/1", StatusCode::OK, b"<html></html>").unwrap_err();
        assert!(matches!(err, SaltError::Decode { .. }));
    }

    #[test]
    fn other_2xx_statuses_are_errors() {
        assert!(matches!(
            decode_body("/jobs/1", StatusCode::CREATED, b"{}"),
            Err(SaltError::Api { .. })
        ));
    }

    #[test]
    fn valid_json_is_returned() {
        let tree = decode_body("/jobs/1", StatusCode::OK, br#"{"return":[]}"#).unwrap();
        assert_eq!(tree, json!({"return": []}));
    }

    // -- extract_jid / extract_token ----------------------------------------

    #[test]
    fn jid_is_extracted() {
        let tree = json!({"return": [{"jid": "20240101", "minions": ["n1"]}]});
        assert_eq!(extract_jid(&tree).unwrap(), "20240101");
    }

    #[test]
    fn jid_shape_errors_name_the_path() {
        for tree in [
            json!({}),
            json!({"return": []}),
            json!({"return": [{"jid": "1"}, {"jid": "2"}]}),
            json!({"return": [{"jid": 42}]}),
            json!({"return": [{}]}),
        ] {
            let err = extract_jid(&tree).unwrap_err();
            assert!(matches!(err, SaltError::Decode { ref path, .. } if path == "return[0]"), "{err}");
        }
    }

    #[test]
    fn token_is_extracted() {
        let tree = json!({"return": [{"token": "abc", "expire": 4_102_444_800.25, "user": "u"}]});
        let token = extract_token(&tree).unwrap();
        assert_eq!(token.value(), "abc");
        assert_eq!(token.expires_at().timestamp(), 4_102_444_800);
        assert!(!token.is_expired());
    }

    #[test]
    fn token_requires_numeric_expire() {
        let tree = json!({"return": [{"token": "abc", "expire": "4102444800"}]});
        assert!(matches!(extract_token(&tree), Err(SaltError::Decode { .. })));
    }

    #[test]
    fn token_requires_token() {
        let tree = json!({"return": [{"expire": 4_102_444_800.0}]});
        let err = extract_token(&tree).unwrap_err();
        assert!(err.to_string().contains("token"), "{err}");
    }

    // -- extract_device_name ------------------------------------------------

    #[test]
    fn device_name_on_success() {
        let tree = json!({"return": [{"node-1": {"success": true, "result": "sdb"}}]});
        assert_eq!(extract_device_name(&tree, "node-1").unwrap(), "sdb");
    }

    #[test]
    fn device_name_failure_surfaces_node_message() {
        let tree = json!({"return": [{"node-1": {"success": false, "result": "no such device"}}]});
        let err = extract_device_name(&tree, "node-1").unwrap_err();
        assert_eq!(err.to_string(), "no such device");
    }

    #[test]
    fn device_name_missing_node() {
        let tree = json!({"return": [{"node-2": {"success": true, "result": "sdb"}}]});
        let err = extract_device_name(&tree, "node-1").unwrap_err();
        assert!(matches!(err, SaltError::Decode { ref path, .. } if path == "return[0].node-1"));
    }

    #[test]
    fn device_name_wrong_shape() {
        let tree = json!({"return": [{"node-1": {"success": "yes", "result": "sdb"}}]});
        assert!(matches!(
            extract_device_name(&tree, "node-1"),
            Err(SaltError::Decode { .. })
        ));
    }

    // -- parse_poll_answer --------------------------------------------------

    #[test]
    fn empty_result_means_still_running() {
        let tree = json!({"info": [{"Function": "state.sls", "Result": {}}]});
        assert_eq!(parse_poll_answer(&tree, "1", "node-1").unwrap(), None);
    }

    #[test]
    fn error_entry_means_job_not_found() {
        let tree = json!({"info": [{"Error": "job not found"}]});
        let err = parse_poll_answer(&tree, "20240101", "node-1").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("20240101"));
        assert!(msg.contains("job not found"));
        assert!(matches!(err, SaltError::JobNotFound { .. }));
    }

    #[test]
    fn success_returns_payload_unchanged() {
        let payload = json!({"device": "/dev/sdb", "size": 1024, "nested": {"a": [1, 2]}});
        let tree = json!({"info": [{
            "Function": "state.sls",
            "Result": {"node-1": {"retcode": 0, "return": payload.clone()}}
        }]});
        assert_eq!(parse_poll_answer(&tree, "1", "node-1").unwrap(), Some(payload));
    }

    #[test]
    fn blocked_state_failed_to_run() {
        let tree = json!({"info": [{
            "Function": "state.sls",
            "Result": {"node-1": {"retcode": 1, "return": [
                "The function \"state.sls\" is running as PID 1234"
            ]}}
        }]});
        let err = parse_poll_answer(&tree, "7", "node-1").unwrap_err();
        assert!(matches!(err, SaltError::JobFailedToRun { .. }));
        let msg = err.to_string();
        assert!(msg.contains("failed to run"));
        assert!(msg.contains("PID 1234"));
    }

    #[test]
    fn retcode_one_from_other_function_is_a_failure() {
        let tree = json!({"info": [{
            "Function": "cmd.run",
            "Result": {"node-1": {"retcode": 1, "return": "exit 1"}}
        }]});
        let err = parse_poll_answer(&tree, "7", "node-1").unwrap_err();
        assert!(matches!(err, SaltError::JobFailed { ref reason, .. } if reason == "exit 1"));
    }

    #[test]
    fn state_failure_carries_root_cause() {
        let tree = json!({"info": [{
            "Function": "state.sls",
            "Result": {"node-1": {"retcode": 2, "return": {
                "mount_|-m_|-/mnt_|-mounted": {
                    "result": false,
                    "comment": "One or more requisite failed: format",
                    "__run_num__": 1
                },
                "cmd_|-format_|-mkfs_|-run": {
                    "result": false,
                    "comment": "mkfs: device busy",
                    "__run_num__": 0
                }
            }}}
        }]});
        let err = parse_poll_answer(&tree, "7", "node-1").unwrap_err();
        assert!(
            matches!(err, SaltError::JobFailed { ref reason, .. } if reason == "mkfs: device busy")
        );
        assert!(!err.to_string().contains("failed to run"));
    }

    #[test]
    fn missing_node_result_names_node() {
        let tree = json!({"info": [{
            "Function": "state.sls",
            "Result": {"node-2": {"retcode": 0, "return": {}}}
        }]});
        let err = parse_poll_answer(&tree, "7", "node-1").unwrap_err();
        assert!(matches!(err, SaltError::Decode { ref path, .. } if path == "info[0].Result.node-1"));
    }

    #[test]
    fn poll_decode_errors_name_the_job() {
        let tree = json!({"info": [{"Result": {}}]});
        let err = parse_poll_answer(&tree, "20240101", "node-1").unwrap_err();
        assert!(
            matches!(err, SaltError::Decode { ref path, ref detail } if path == "info[0].Function" && detail.starts_with("job 20240101: "))
        );
        assert!(err.to_string().contains("20240101"));
    }

    #[test]
    fn malformed_poll_answers_are_decode_errors() {
        for tree in [
            json!({}),
            json!({"info": []}),
            json!({"info": [{}, {}]}),
            json!({"info": [{"Result": {}}]}),
            json!({"info": [{"Function": "state.sls"}]}),
            json!({"info": [{"Function": "state.sls", "Result": []}]}),
            json!({"info": [{"Function": "state.sls", "Result": {"node-1": {"retcode": "0", "return": {}}}}]}),
        ] {
            let err = parse_poll_answer(&tree, "7", "node-1").unwrap_err();
            assert!(matches!(err, SaltError::Decode { .. }), "{tree}: {err}");
        }
    }

    // -- state_failure_root_cause -------------------------------------------

    #[test]
    fn root_cause_skips_cascading_failures() {
        let output = json!({
            "a": {"result": false, "comment": "One or more requisite failed because X"},
            "b": {"result": false, "comment": "real reason"}
        });
        assert_eq!(state_failure_root_cause(&output), "real reason");
    }

    #[test]
    fn root_cause_ignores_successful_states() {
        let output = json!({
            "a": {"result": true, "comment": "all good"},
            "b": {"result": false, "comment": "disk full"}
        });
        assert_eq!(state_failure_root_cause(&output), "disk full");
    }

    #[test]
    fn root_cause_not_found_fallback() {
        let output = json!({
            "a": {"result": false, "comment": "One or more requisite failed: b"},
            "b": {"result": false, "comment": "One or more requisite failed: a"}
        });
        assert_eq!(state_failure_root_cause(&output), ROOT_CAUSE_NOT_FOUND);
    }

    #[test]
    fn root_cause_renders_list_comments() {
        let output = json!({
            "a": {"result": false, "comment": ["One or more requisite failed: b"], "__run_num__": 1},
            "b": {"result": false, "comment": ["mkfs failed", "device busy"], "__run_num__": 0}
        });
        assert_eq!(state_failure_root_cause(&output), "mkfs failed; device busy");
    }

    #[test]
    fn root_cause_plain_string() {
        assert_eq!(
            state_failure_root_cause(&json!("Pillar failed to render")),
            "Pillar failed to render"
        );
    }

    #[test]
    fn root_cause_unexpected_type() {
        let reason = state_failure_root_cause(&json!(42));
        assert!(reason.contains("number"), "{reason}");
    }
}
