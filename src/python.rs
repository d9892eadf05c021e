//! Python bindings: an `Encoder` class over the Rust decoder.

use pyo3::prelude::*;
use pyo3::sync::GILOnceCell;
use pyo3::types::{PyBytes, PyDate, PyDateTime, PyDict, PyList, PyString, PyTime, PyType};

use chrono::{Datelike, Timelike};

use crate::encoder::Encoder;
use crate::wire::types::Value;
use crate::wire::unpack::Row;

static DECIMAL_TYPE: GILOnceCell<Py<PyType>> = GILOnceCell::new();

#[inline]
fn micros(nanos: u32) -> u32 {
    // Leap seconds carry nanos >= 1e9
    (nanos / 1_000).min(999_999)
}

/// Convert a decoded value to its Python counterpart.
fn value_to_py(py: Python<'_>, val: &Value) -> PyResult<PyObject> {
    let obj = match val {
        Value::Null => py.None(),
        Value::Text(s) => PyString::new(py, s).into_any().unbind(),
        Value::Int(i) => (*i).into_pyobject(py)?.into_any().unbind(),
        Value::Float(f) => (*f).into_pyobject(py)?.into_any().unbind(),
        Value::Decimal(d) => DECIMAL_TYPE
            .import(py, "decimal", "Decimal")?
            .call1((d.to_string(),))?
            .unbind(),
        Value::Bytes(b) => PyBytes::new(py, b).into_any().unbind(),
        Value::Date(d) => PyDate::new(py, d.year(), d.month() as u8, d.day() as u8)?
            .into_any()
            .unbind(),
        Value::Time(t) => PyTime::new(
            py,
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
            micros(t.nanosecond()),
            None,
        )?
        .into_any()
        .unbind(),
        Value::Timestamp(ts) => PyDateTime::new(
            py,
            ts.year(),
            ts.month() as u8,
            ts.day() as u8,
            ts.hour() as u8,
            ts.minute() as u8,
            ts.second() as u8,
            micros(ts.nanosecond()),
            None,
        )?
        .into_any()
        .unbind(),
    };
    Ok(obj)
}

fn row_to_py(py: Python<'_>, row: &Row) -> PyResult<PyObject> {
    let obj = match row {
        Row::Text(line) => PyString::new(py, line).into_any().unbind(),
        Row::Map(map) => {
            let dict = PyDict::new(py);
            for (name, val) in map {
                dict.set_item(name, value_to_py(py, val)?)?;
            }
            dict.into_any().unbind()
        }
        Row::List(values) => {
            let items = values
                .iter()
                .map(|v| value_to_py(py, v))
                .collect::<PyResult<Vec<_>>>()?;
            PyList::new(py, items)?.into_any().unbind()
        }
        Row::Raw(bytes) => PyBytes::new(py, bytes).into_any().unbind(),
    };
    Ok(obj)
}

/// Python values accepted by `pack_row`. Anything not listed is packed
/// through its `str()` form, which covers `decimal.Decimal` and the
/// `datetime` types.
fn py_to_value(obj: &Bound<'_, PyAny>) -> PyResult<Value> {
    if obj.is_none() {
        return Ok(Value::Null);
    }
    if let Ok(b) = obj.downcast::<PyBytes>() {
        return Ok(Value::Bytes(b.as_bytes().to_vec()));
    }
    if let Ok(s) = obj.downcast::<PyString>() {
        return Ok(Value::Text(s.to_str()?.to_string()));
    }
    if let Ok(i) = obj.extract::<i64>() {
        return Ok(Value::Int(i));
    }
    if obj.is_instance_of::<pyo3::types::PyFloat>() {
        return Ok(Value::Float(obj.extract()?));
    }
    Ok(Value::Text(obj.str()?.to_str()?.to_string()))
}

/// Row decoder bound to one statement.
#[pyclass(name = "Encoder")]
pub struct PyEncoder {
    inner: Encoder,
}

#[pymethods]
impl PyEncoder {
    #[new]
    #[pyo3(signature = (settings=0))]
    fn new(settings: u32) -> PyResult<Self> {
        Ok(Self {
            inner: Encoder::new(settings)?,
        })
    }

    fn set_encoding(&mut self, settings: u32) -> PyResult<()> {
        Ok(self.inner.set_encoding(settings)?)
    }

    fn set_delimiter(&mut self, delimiter: &str) {
        self.inner.set_delimiter(delimiter);
    }

    #[pyo3(signature = (null=None))]
    fn set_null(&mut self, null: Option<&str>) {
        self.inner.set_null(null);
    }

    fn clear(&mut self) {
        self.inner.clear();
    }

    /// Column names of the installed schema.
    #[getter]
    fn columns(&self) -> Vec<String> {
        self.inner
            .columns()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    fn unpack_stmt_info(&mut self, data: &[u8]) -> PyResult<Vec<String>> {
        self.inner.unpack_stmt_info(data)?;
        Ok(self.columns())
    }

    fn unpack_row(&self, py: Python<'_>, data: &[u8]) -> PyResult<PyObject> {
        let row = self.inner.unpack_row(data)?;
        row_to_py(py, &row)
    }

    fn unpack_rows<'py>(&self, py: Python<'py>, data: &[u8]) -> PyResult<Bound<'py, PyList>> {
        let rows = self.inner.unpack_rows(data)?;
        let items = rows
            .iter()
            .map(|row| row_to_py(py, row))
            .collect::<PyResult<Vec<_>>>()?;
        PyList::new(py, items)
    }

    fn count_rows(&self, data: &[u8]) -> PyResult<usize> {
        Ok(self.inner.count_rows(data)?)
    }

    fn pack_row<'py>(
        &self,
        py: Python<'py>,
        values: Vec<Bound<'py, PyAny>>,
    ) -> PyResult<Bound<'py, PyBytes>> {
        let values = values
            .iter()
            .map(py_to_value)
            .collect::<PyResult<Vec<_>>>()?;
        let packed = self.inner.pack_row(&values)?;
        Ok(PyBytes::new(py, &packed))
    }

    fn __repr__(&self) -> String {
        format!(
            "<Encoder columns={} settings={:#x}>",
            self.inner.columns().len(),
            self.inner.settings().0
        )
    }
}
