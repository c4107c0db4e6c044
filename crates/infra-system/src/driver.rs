// Driver scripts wrapped around probe source, and the line protocol they print
//
// Every event is one stdout line: `__compat_table__:<TAG> <json payload>`
// - RETURN true|false     sync probe returned (truthiness computed by the engine)
// - THROW "msg"|null      evaluation threw (null: thrown value had no message)
// - READY null            async probe setup finished without throwing
// - PASS null / FAIL null async probe signaled (first signal only)
// Any other output of the probe is ignored.

use serde_json::Value;

/// Prefix of every protocol line
pub const EVENT_MARKER: &str = "__compat_table__:";

/// Event printed by a driver script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    Returned(bool),
    Threw(Option<String>),
    Ready,
    Passed,
    Failed,
}

const HELPERS: &str = r#"  var __print = %PRINT%;
  var __stringify = JSON.stringify;
  var __emit = function (tag, payload) {
    __print('%MARKER%' + tag + ' ' + __stringify(payload));
  };
  var __message = function (e) {
    return (e !== null && e !== undefined && e.message !== undefined) ? String(e.message) : null;
  };
"#;

const SYNC_TEMPLATE: &str = r#"%PRELUDE%
;(function () {
%HELPERS%  try {
    var __probe = new Function(%SOURCE%);
    __emit('RETURN', !!__probe());
  } catch (e) {
    __emit('THROW', __message(e));
  }
})();
"#;

const ASYNC_TEMPLATE: &str = r#"%PRELUDE%
;(function () {
%HELPERS%  var __settled = false;
  var __signal = function (tag) {
    return function () {
      if (!__settled) {
        __settled = true;
        __emit(tag, null);
      }
    };
  };
  try {
    var __probe = new Function(%PASS%, %FAIL%, %SOURCE%);
    __probe(__signal('PASS'), __signal('FAIL'));
    __emit('READY', null);
  } catch (e) {
    __emit('THROW', __message(e));
  }
})();
"#;

/// JavaScript string literal holding `text`
fn js_string(text: &str) -> String {
    Value::String(text.to_owned()).to_string()
}

fn render(template: &str, print_function: &str, prelude: &str, source: &str) -> String {
    // Probe source is substituted last so it is never scanned for placeholders
    template
        .replace("%HELPERS%", HELPERS)
        .replace("%PRINT%", print_function)
        .replace("%MARKER%", EVENT_MARKER)
        .replace("%PRELUDE%", prelude)
        .replace("%SOURCE%", &js_string(source))
}

/// Driver evaluating `source` as an isolated function body
pub fn sync_script(prelude: &str, source: &str, print_function: &str) -> String {
    render(SYNC_TEMPLATE, print_function, prelude, source)
}

/// Driver evaluating `source` with the two callbacks bound as parameters
pub fn async_script(
    prelude: &str,
    source: &str,
    print_function: &str,
    pass_callback: &str,
    fail_callback: &str,
) -> String {
    let template = ASYNC_TEMPLATE
        .replace("%PASS%", &js_string(pass_callback))
        .replace("%FAIL%", &js_string(fail_callback));
    render(&template, print_function, prelude, source)
}

/// Deadline appended to async probe source; skipped by shells without timers
pub fn deadline_script(fail_callback: &str, deadline_ms: u128) -> String {
    format!(
        "if (typeof setTimeout === 'function') {{ setTimeout({}, {}); }}",
        fail_callback, deadline_ms
    )
}

/// Parse one stdout line; `None` for regular probe output
pub fn parse_event(line: &str) -> Option<DriverEvent> {
    let rest = line.trim_end().strip_prefix(EVENT_MARKER)?;
    let (tag, payload) = rest.split_once(' ').unwrap_or((rest, "null"));
    let payload: Value = serde_json::from_str(payload).ok()?;

    match tag {
        "RETURN" => payload.as_bool().map(DriverEvent::Returned),
        "THROW" => Some(DriverEvent::Threw(payload.as_str().map(str::to_string))),
        "READY" => Some(DriverEvent::Ready),
        "PASS" => Some(DriverEvent::Passed),
        "FAIL" => Some(DriverEvent::Failed),
        _ => None,
    }
}
