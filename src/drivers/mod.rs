pub mod synaptics_tcm;
