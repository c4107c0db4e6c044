// Helper globals injected ahead of every probe evaluated by an external shell

/// `global` alias plus `__createIterableObject`, the iterable helper the
/// compat-table probes expect to find in their environment
pub const COMPAT_PRELUDE: &str = r#"var global = (function () { return this; })() || {};
global.__createIterableObject = function (arr, methods) {
  methods = methods || {};
  if (typeof Symbol !== 'function' || !Symbol.iterator) {
    return {};
  }
  arr.length++;
  var iterator = {
    next: function () {
      return { value: arr.shift(), done: arr.length <= 0 };
    },
    'return': methods['return'],
    'throw': methods['throw']
  };
  var iterable = {};
  iterable[Symbol.iterator] = function () { return iterator; };
  return iterable;
};
"#;
