//! Run directories and dataset files.
//!
//! Every node run writes into its own directory:
//!
//! ```text
//!   <root>/<YYYY-MM-DD>/<HH-MM-SS>-<shortid>-<node>/
//!       device_snapshot_0.json
//!       dataset_0.hdf5        (dataset_0.json without the `hdf5` feature)
//!       dataset_1.hdf5
//! ```
//!
//! Complex data is stored as `f64` with an extra trailing axis of length 2
//! holding `[re, im]`; [`load_dataset`] recombines it.

use std::path::{Path, PathBuf};

use ndarray::{ArrayD, IxDyn};
use num_complex::Complex64;
use qcal_core::PhysicalElement;
use qcal_hal::DeviceSnapshot;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::{AssembledDataset, Axis, ElementDataset, LabeledArray};
use crate::error::{PersistError, PersistResult};

/// Extension of dataset files written by this build.
#[cfg(feature = "hdf5")]
pub const DATASET_EXTENSION: &str = "hdf5";
/// Extension of dataset files written by this build.
#[cfg(not(feature = "hdf5"))]
pub const DATASET_EXTENSION: &str = "json";

/// Output directory of one node run.
#[derive(Debug, Clone)]
pub struct RunDirectory {
    path: PathBuf,
}

impl RunDirectory {
    /// Create `<root>/<date>/<time>-<shortid>-<node>/`.
    pub fn create(root: impl AsRef<Path>, node: &str) -> PersistResult<Self> {
        let now = chrono::Local::now();
        let short_id = uuid::Uuid::new_v4().simple().to_string();
        let name = format!(
            "{}-{}-{}",
            now.format("%H-%M-%S"),
            &short_id[..8],
            node
        );
        let path = root
            .as_ref()
            .join(now.format("%Y-%m-%d").to_string())
            .join(name);
        std::fs::create_dir_all(&path)?;
        debug!("Created run directory {}", path.display());
        Ok(Self { path })
    }

    /// Use an existing directory as is.
    pub fn open(path: impl Into<PathBuf>) -> PersistResult<Self> {
        let path = path.into();
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    /// Directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// First `<prefix>_<n>.<extension>` that does not exist yet.
    pub fn next_free(&self, prefix: &str, extension: &str) -> PathBuf {
        (0..)
            .map(|n| self.path.join(format!("{prefix}_{n}.{extension}")))
            .find(|candidate| !candidate.exists())
            .unwrap_or_else(|| self.path.join(format!("{prefix}.{extension}")))
    }

    /// Save the device snapshot used for a compilation.
    pub fn write_snapshot(&self, snapshot: &DeviceSnapshot) -> PersistResult<PathBuf> {
        let path = self.next_free("device_snapshot", "json");
        std::fs::write(&path, serde_json::to_string_pretty(snapshot)?)?;
        debug!("Saved device snapshot to {}", path.display());
        Ok(path)
    }

    /// Save a dataset as `dataset_<n>`.
    pub fn write_dataset(&self, dataset: &AssembledDataset) -> PersistResult<PathBuf> {
        let path = self.next_free("dataset", DATASET_EXTENSION);
        let stored = StoredDataset::from(dataset);
        #[cfg(feature = "hdf5")]
        hdf5_io::write(&path, &stored)?;
        #[cfg(not(feature = "hdf5"))]
        std::fs::write(&path, serde_json::to_vec(&stored)?)?;
        debug!("Saved dataset to {}", path.display());
        Ok(path)
    }
}

/// Read a dataset file written by [`RunDirectory::write_dataset`].
pub fn load_dataset(path: impl AsRef<Path>) -> PersistResult<AssembledDataset> {
    let path = path.as_ref();
    let stored: StoredDataset = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_slice(&std::fs::read(path)?)?,
        #[cfg(feature = "hdf5")]
        Some("hdf5") | Some("h5") => hdf5_io::read(path)?,
        _ => return Err(PersistError::UnsupportedFormat(path.to_path_buf())),
    };
    stored.into_dataset(path)
}

/// On-disk form of a [`LabeledArray`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredArray {
    axes: Vec<Axis>,
    /// Array shape plus the trailing `[re, im]` axis.
    shape: Vec<usize>,
    #[serde(with = "nan_as_null")]
    data: Vec<f64>,
}

/// JSON has no NaN; gaps left by merging are written as `null`.
mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(|v| (!v.is_nan()).then_some(*v)))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let values: Vec<Option<f64>> = Vec::deserialize(deserializer)?;
        Ok(values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }
}

impl From<&LabeledArray> for StoredArray {
    fn from(array: &LabeledArray) -> Self {
        let mut shape = array.shape().to_vec();
        shape.push(2);
        let data = array
            .data
            .iter()
            .flat_map(|value| [value.re, value.im])
            .collect();
        Self {
            axes: array.axes.clone(),
            shape,
            data,
        }
    }
}

impl StoredArray {
    fn into_array(self, path: &Path) -> PersistResult<LabeledArray> {
        let corrupt = |reason: String| PersistError::Corrupt {
            path: path.to_path_buf(),
            reason,
        };
        let Some((&2, shape)) = self.shape.split_last() else {
            return Err(corrupt(format!("shape {:?} lacks a [re, im] axis", self.shape)));
        };
        if self.data.len() != self.shape.iter().product::<usize>() {
            return Err(corrupt(format!(
                "{} values for shape {:?}",
                self.data.len(),
                self.shape
            )));
        }
        let values: Vec<Complex64> = self
            .data
            .chunks_exact(2)
            .map(|pair| Complex64::new(pair[0], pair[1]))
            .collect();
        let data = ArrayD::from_shape_vec(IxDyn(shape), values)
            .map_err(|e| corrupt(e.to_string()))?;
        LabeledArray::new(self.axes, data).map_err(|e| corrupt(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredElement {
    element: PhysicalElement,
    acquisition: u32,
    values: StoredArray,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    calibration: Option<StoredArray>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDataset {
    node: String,
    elements: Vec<StoredElement>,
}

impl From<&AssembledDataset> for StoredDataset {
    fn from(dataset: &AssembledDataset) -> Self {
        Self {
            node: dataset.node.clone(),
            elements: dataset
                .elements
                .values()
                .map(|data| StoredElement {
                    element: data.element.clone(),
                    acquisition: data.acquisition,
                    values: StoredArray::from(&data.values),
                    calibration: data.calibration.as_ref().map(StoredArray::from),
                })
                .collect(),
        }
    }
}

impl StoredDataset {
    fn into_dataset(self, path: &Path) -> PersistResult<AssembledDataset> {
        let mut dataset = AssembledDataset::new(self.node);
        for stored in self.elements {
            dataset.insert(ElementDataset {
                element: stored.element,
                acquisition: stored.acquisition,
                values: stored.values.into_array(path)?,
                calibration: stored
                    .calibration
                    .map(|c| c.into_array(path))
                    .transpose()?,
            });
        }
        Ok(dataset)
    }
}

#[cfg(feature = "hdf5")]
mod hdf5_io {
    //! One group per element holding a `values` dataset (and `calibration`
    //! if present). Axis metadata is kept as a JSON string attribute, axis
    //! coordinates as `coord:<axis>` datasets.

    use std::path::Path;

    use hdf5::types::VarLenUnicode;
    use hdf5::{File, Group};
    use ndarray::{ArrayD, IxDyn};

    use super::{StoredArray, StoredDataset, StoredElement};
    use crate::error::{PersistError, PersistResult};

    const NODE_ATTR: &str = "node";
    const ELEMENT_ATTR: &str = "element";
    const ACQUISITION_ATTR: &str = "acquisition";
    const AXES_ATTR: &str = "axes";

    pub(super) fn write(path: &Path, dataset: &StoredDataset) -> PersistResult<()> {
        let file = File::create(path)?;
        write_str_attr(&file, NODE_ATTR, &dataset.node)?;
        for (i, element) in dataset.elements.iter().enumerate() {
            let group = file.create_group(&format!("element_{i}"))?;
            write_str_attr(&group, ELEMENT_ATTR, element.element.id())?;
            group
                .new_attr::<u32>()
                .create(ACQUISITION_ATTR)?
                .write_scalar(&element.acquisition)?;
            write_array(&group, "values", &element.values)?;
            if let Some(calibration) = &element.calibration {
                write_array(&group, "calibration", calibration)?;
            }
        }
        Ok(())
    }

    pub(super) fn read(path: &Path) -> PersistResult<StoredDataset> {
        let file = File::open(path)?;
        let node = read_str_attr(&file, NODE_ATTR)?;
        let mut elements = Vec::new();
        let mut names = file.member_names()?;
        names.sort_by_key(|name| {
            name.trim_start_matches("element_")
                .parse::<usize>()
                .unwrap_or(usize::MAX)
        });
        for name in names {
            let group = file.group(&name)?;
            let id = read_str_attr(&group, ELEMENT_ATTR)?;
            let element = id.parse().map_err(|e: qcal_core::SamplespaceError| {
                PersistError::Corrupt {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                }
            })?;
            let acquisition = group.attr(ACQUISITION_ATTR)?.read_scalar::<u32>()?;
            let values = read_array(&group, "values")?;
            let calibration = if group.link_exists("calibration") {
                Some(read_array(&group, "calibration")?)
            } else {
                None
            };
            elements.push(StoredElement {
                element,
                acquisition,
                values,
                calibration,
            });
        }
        Ok(StoredDataset { node, elements })
    }

    fn write_array(group: &Group, name: &str, array: &StoredArray) -> PersistResult<()> {
        let data = ArrayD::from_shape_vec(IxDyn(&array.shape), array.data.clone())
            .map_err(|e| PersistError::Corrupt {
                path: group.filename().into(),
                reason: e.to_string(),
            })?;
        let dataset = group
            .new_dataset::<f64>()
            .shape(array.shape.clone())
            .create(name)?;
        dataset.write(&data)?;
        let axes = serde_json::to_string(&array.axes)?;
        let attr: VarLenUnicode = axes.parse().map_err(|_| PersistError::Corrupt {
            path: group.filename().into(),
            reason: format!("axis metadata of '{name}' is not valid unicode"),
        })?;
        dataset
            .new_attr::<VarLenUnicode>()
            .create(AXES_ATTR)?
            .write_scalar(&attr)?;
        for axis in &array.axes {
            let coord_name = format!("{name}:coord:{}", axis.name);
            if !group.link_exists(&coord_name) {
                group
                    .new_dataset::<f64>()
                    .shape([axis.coords.len()])
                    .create(coord_name.as_str())?
                    .write(axis.coords.as_slice())?;
            }
        }
        Ok(())
    }

    fn read_array(group: &Group, name: &str) -> PersistResult<StoredArray> {
        let dataset = group.dataset(name)?;
        let shape = dataset.shape();
        let data = dataset.read_raw::<f64>()?;
        let axes_json = dataset.attr(AXES_ATTR)?.read_scalar::<VarLenUnicode>()?;
        let axes = serde_json::from_str(axes_json.as_str())?;
        Ok(StoredArray { axes, shape, data })
    }

    fn write_str_attr(location: &hdf5::Location, name: &str, value: &str) -> PersistResult<()> {
        let value: VarLenUnicode = value.parse().map_err(|_| PersistError::Corrupt {
            path: location.filename().into(),
            reason: format!("attribute '{name}' is not valid unicode"),
        })?;
        location
            .new_attr::<VarLenUnicode>()
            .create(name)?
            .write_scalar(&value)?;
        Ok(())
    }

    fn read_str_attr(location: &hdf5::Location, name: &str) -> PersistResult<String> {
        let value = location.attr(name)?.read_scalar::<VarLenUnicode>()?;
        Ok(value.as_str().to_string())
    }
}
