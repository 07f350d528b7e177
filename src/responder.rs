//! The RDM responder: request validation, per-PID dispatch and response
//! assembly.
//!
//! A [`ResponderCore`] owns the parameter table of one port. Incoming
//! requests flow through a fixed validation ladder (addressing, command
//! class, sub-device) and end in one of three handler kinds: `Simple`
//! parameters serialize and deserialize their storage through a format
//! string, built-in parameters implement the protocol-mandated special
//! cases, and `Custom` handlers let the application register
//! manufacturer-specific PIDs. Requests for unregistered PIDs fall through
//! to the poll-level [`DmxResponderHandler`].

use crate::command_class::{CommandClassSet, RequestCommandClass};
use crate::consts::{DMX_START_ADDRESS_NONE, RDM_MAX_PDL};
use crate::format;
use crate::hal::{nvs_key, NvsStore};
use crate::parameter::{
    ds, ParameterDefinition, ParameterError, ParameterHandler, ParameterSchema, ParameterTable,
    PREFIX_NONE, UNITS_NONE,
};
use crate::pids;
use crate::rdm_data::{RdmRequestData, RdmResponseData};
use crate::rdm_types::DiscoveryMuteResponse;
use crate::types::{DataPack, NackReason, ResponseType};
use crate::unique_identifier::UniqueIdentifier;

/// One DMX personality: its footprint and a human-readable description.
#[derive(Copy, Clone, Debug)]
pub struct Personality {
    /// Slots occupied, 1..=512.
    pub footprint: u16,
    pub description: &'static str,
}

/// The result object of an RDM handler.
pub enum RdmResult {
    /// The request was acknowledged. The [DataPack] contains the response
    /// data; anything past 231 bytes is truncated.
    Acknowledged(DataPack),
    /// The request was acknowledged but a result can not be delivered
    /// immediately. The [u16] is the wait estimate in 100ms steps.
    AcknowledgedTimer(u16),
    /// The request was not acknowledged. The [u16] is the [NackReason].
    NotAcknowledged(u16),
    /// The responder does not reply with anything.
    NoResponse,
    /// A fully custom response packet.
    Custom(RdmResponseData),
}

/// Handler for manufacturer-specific PIDs registered with
/// [`ParameterHandler::Custom`].
pub type CustomHandler = fn(&mut ResponderCore, &RdmRequestData) -> RdmResult;

/// What the port driver should put on the wire.
pub enum RdmAnswer {
    /// Has to be sent with a break.
    Response(RdmResponseData),
    /// A DISC_UNIQUE_BRANCH reply, sent without a break.
    DiscoveryResponse(UniqueIdentifier),
    /// No response to send.
    NoResponse,
}

/// A mutation performed by a dispatched SET, reported so the port can
/// write it through to non-volatile storage and fire user callbacks.
#[derive(Copy, Clone, Debug)]
pub struct ChangedParameter {
    pub pid: u16,
    pub non_volatile: bool,
}

pub struct DispatchOutcome {
    pub answer: RdmAnswer,
    pub changed: Option<ChangedParameter>,
}

/// A handler for dmx frames and rdm requests the responder does not
/// implement itself.
pub trait DmxResponderHandler {
    type Error;

    /// Handle rdm requests that aren't handled by the [ResponderCore] itself.
    fn handle_rdm(
        &mut self,
        _request: &RdmRequestData,
        _responder: &mut ResponderCore,
    ) -> Result<RdmResult, Self::Error> {
        Ok(RdmResult::NotAcknowledged(NackReason::UnknownPid as u16))
    }

    /// Handle received frames with a start code other than `0xCC`. The
    /// first byte is the start code; `0x00` marks a DMX frame.
    fn handle_dmx(
        &mut self,
        _frame: &[u8],
        _responder: &mut ResponderCore,
    ) -> Result<(), Self::Error> {
        Ok(())
    }
}

// Offsets into the host-order DEVICE_INFO slab. The first two bytes hold
// the protocol-version literal emitted by the format string.
const DI_SIZE: usize = 19;
const DI_FOOTPRINT: usize = 10;
const DI_CURRENT_PERSONALITY: usize = 12;
const DI_PERSONALITY_COUNT: usize = 13;
const DI_START_ADDRESS: usize = 14;
const DEVICE_INFO_FORMAT: &str = "#0100hwwdwbbwwb$";

/// Identity and metadata of the device a responder presents on the bus.
#[derive(Copy, Clone)]
pub struct DeviceConfig {
    pub model_id: u16,
    pub product_category: u16,
    pub software_version_id: u32,
    /// At most 32 ASCII bytes.
    pub software_version_label: &'static str,
    /// At most 32 ASCII bytes. Overridden by a persisted label.
    pub device_label: &'static str,
    /// 1-indexed personality table; empty for zero-footprint devices.
    pub personalities: &'static [Personality],
    /// 0 restores the persisted personality (default 1).
    pub current_personality: u8,
    /// 0 restores the persisted address (default 1); 0xFFFF means none.
    pub dmx_start_address: u16,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            model_id: 0,
            product_category: 0,
            software_version_id: 0,
            software_version_label: "dmx-rdm-port device",
            device_label: "",
            personalities: &[],
            current_personality: 0,
            dmx_start_address: 0,
        }
    }
}

pub struct ResponderCore {
    port_num: u8,
    uid: UniqueIdentifier,
    /// Reported in mute replies when the device exposes multiple ports.
    binding_uid: Option<UniqueIdentifier>,
    personalities: &'static [Personality],
    pub params: ParameterTable,
}

impl ResponderCore {
    /// Builds the responder and registers the required PIDs, restoring
    /// persisted values where the config asks for it.
    pub fn new(
        port_num: u8,
        uid: UniqueIdentifier,
        binding_uid: Option<UniqueIdentifier>,
        config: &DeviceConfig,
        heap_size: usize,
        nvs: &mut dyn NvsStore,
    ) -> Result<Self, ParameterError> {
        let mut core = Self {
            port_num,
            uid,
            binding_uid,
            personalities: config.personalities,
            params: ParameterTable::new(heap_size),
        };

        core.register_required(config, nvs)?;
        Ok(core)
    }

    pub fn uid(&self) -> UniqueIdentifier {
        self.uid
    }

    pub fn port_num(&self) -> u8 {
        self.port_num
    }

    pub fn message_count(&self) -> u8 {
        self.params.message_count()
    }

    pub fn is_muted(&self) -> bool {
        self.params
            .get(pids::DISC_MUTE)
            .is_some_and(|slab| slab[0] != 0)
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.params.set(pids::DISC_MUTE, &[muted as u8]);
    }

    pub fn identify(&self) -> bool {
        self.params
            .get(pids::IDENTIFY_DEVICE)
            .is_some_and(|slab| slab[0] != 0)
    }

    pub fn dmx_start_address(&self) -> u16 {
        self.device_info_word(DI_START_ADDRESS)
    }

    pub fn footprint(&self) -> u16 {
        self.device_info_word(DI_FOOTPRINT)
    }

    pub fn current_personality(&self) -> u8 {
        self.params
            .get(pids::DEVICE_INFO)
            .map_or(0, |slab| slab[DI_CURRENT_PERSONALITY])
    }

    fn device_info_word(&self, offset: usize) -> u16 {
        self.params.get(pids::DEVICE_INFO).map_or(0, |slab| {
            u16::from_ne_bytes(slab[offset..offset + 2].try_into().unwrap())
        })
    }

    fn set_device_info_word(&mut self, offset: usize, value: u16) {
        if let Some(slab) = self.params.get_mut(pids::DEVICE_INFO) {
            slab[offset..offset + 2].copy_from_slice(&value.to_ne_bytes());
        }
    }

    // Registration -------------------------------------------------------

    fn register_required(
        &mut self,
        config: &DeviceConfig,
        nvs: &mut dyn NvsStore,
    ) -> Result<(), ParameterError> {
        let disc_def = |pid: u16, description: &'static str| ParameterDefinition {
            pid,
            schema: ParameterSchema {
                command_class: CommandClassSet::Disc,
                data_type: ds::NOT_DEFINED,
                pdl_size: 0,
                min_value: 0,
                max_value: 0,
                default_value: 0,
                format: "",
            },
            unit: UNITS_NONE,
            prefix: PREFIX_NONE,
            description,
            alloc_size: 1,
            non_volatile: false,
            handler: ParameterHandler::Builtin,
        };

        self.params
            .add_deterministic(disc_def(pids::DISC_UNIQUE_BRANCH, "Discovery Unique Branch"))?;
        self.params
            .add_new(disc_def(pids::DISC_MUTE, "Discovery Mute"), Some(&[0]))?;
        self.params
            .add_alias(disc_def(pids::DISC_UN_MUTE, "Discovery Un-Mute"), pids::DISC_MUTE, 0)?;

        // Resolve the start address and personality, preferring persisted
        // values when the config leaves them at zero.
        let personality_count = config.personalities.len() as u8;
        let current_personality = if config.current_personality == 0 {
            let mut stored = [0u8; 1];
            let restored = nvs
                .load(&nvs_key(self.port_num, pids::DMX_PERSONALITY), &mut stored)
                .map(|_| stored[0]);
            match restored {
                Some(p) if (1..=personality_count).contains(&p) => p,
                _ => 1u8.min(personality_count),
            }
        } else {
            config.current_personality
        };

        let footprint = if current_personality == 0 {
            0
        } else {
            config.personalities[current_personality as usize - 1].footprint
        };

        let dmx_start_address = if footprint == 0 {
            DMX_START_ADDRESS_NONE
        } else if config.dmx_start_address == 0 {
            let mut stored = [0u8; 2];
            nvs.load(&nvs_key(self.port_num, pids::DMX_START_ADDRESS), &mut stored)
                .map(|_| u16::from_ne_bytes(stored))
                .filter(|address| (1..=512).contains(address))
                .unwrap_or(1)
        } else {
            config.dmx_start_address
        };

        let mut device_info = [0u8; DI_SIZE];
        device_info[2..4].copy_from_slice(&config.model_id.to_ne_bytes());
        device_info[4..6].copy_from_slice(&config.product_category.to_ne_bytes());
        device_info[6..10].copy_from_slice(&config.software_version_id.to_ne_bytes());
        device_info[DI_FOOTPRINT..DI_FOOTPRINT + 2].copy_from_slice(&footprint.to_ne_bytes());
        device_info[DI_CURRENT_PERSONALITY] = current_personality;
        device_info[DI_PERSONALITY_COUNT] = personality_count;
        device_info[DI_START_ADDRESS..DI_START_ADDRESS + 2]
            .copy_from_slice(&dmx_start_address.to_ne_bytes());

        self.params.add_new(
            ParameterDefinition {
                pid: pids::DEVICE_INFO,
                schema: ParameterSchema {
                    command_class: CommandClassSet::Get,
                    data_type: ds::BIT_FIELD,
                    pdl_size: DI_SIZE as u8,
                    min_value: 0,
                    max_value: 0,
                    default_value: 0,
                    format: DEVICE_INFO_FORMAT,
                },
                unit: UNITS_NONE,
                prefix: PREFIX_NONE,
                description: "Device Info",
                alloc_size: DI_SIZE,
                non_volatile: false,
                handler: ParameterHandler::Simple,
            },
            Some(&device_info),
        )?;

        let ascii_def = |pid: u16,
                         description: &'static str,
                         command_class: CommandClassSet,
                         non_volatile: bool| ParameterDefinition {
            pid,
            schema: ParameterSchema {
                command_class,
                data_type: ds::ASCII,
                pdl_size: 32,
                min_value: 0,
                max_value: 0,
                default_value: 0,
                format: "a$",
            },
            unit: UNITS_NONE,
            prefix: PREFIX_NONE,
            description,
            alloc_size: 32,
            non_volatile,
            handler: ParameterHandler::Simple,
        };

        let mut label = [0u8; 32];
        copy_ascii_init(&mut label, config.software_version_label);
        self.params.add_new(
            ascii_def(
                pids::SOFTWARE_VERSION_LABEL,
                "Software Version Label",
                CommandClassSet::Get,
                false,
            ),
            Some(&label),
        )?;

        let mut label = [0u8; 32];
        if nvs
            .load(&nvs_key(self.port_num, pids::DEVICE_LABEL), &mut label)
            .is_none()
        {
            copy_ascii_init(&mut label, config.device_label);
        }
        self.params.add_new(
            ascii_def(
                pids::DEVICE_LABEL,
                "Device Label",
                CommandClassSet::GetSet,
                true,
            ),
            Some(&label),
        )?;

        self.params.add_new(
            ParameterDefinition {
                pid: pids::IDENTIFY_DEVICE,
                schema: ParameterSchema {
                    command_class: CommandClassSet::GetSet,
                    data_type: ds::UNSIGNED_BYTE,
                    pdl_size: 1,
                    min_value: 0,
                    max_value: 1,
                    default_value: 0,
                    format: "b$",
                },
                unit: UNITS_NONE,
                prefix: PREFIX_NONE,
                description: "Identify Device",
                alloc_size: 1,
                non_volatile: false,
                handler: ParameterHandler::Simple,
            },
            Some(&[0]),
        )?;

        self.params.add_alias(
            ParameterDefinition {
                pid: pids::DMX_PERSONALITY,
                schema: ParameterSchema {
                    command_class: CommandClassSet::GetSet,
                    data_type: ds::UNSIGNED_BYTE,
                    pdl_size: 1,
                    min_value: 1,
                    max_value: personality_count.max(1) as u32,
                    default_value: 1,
                    format: "b$",
                },
                unit: UNITS_NONE,
                prefix: PREFIX_NONE,
                description: "DMX Personality",
                alloc_size: 1,
                non_volatile: true,
                handler: ParameterHandler::Builtin,
            },
            pids::DEVICE_INFO,
            DI_CURRENT_PERSONALITY,
        )?;

        let deterministic_get = |pid: u16, description: &'static str, pdl_size: u8| {
            ParameterDefinition {
                pid,
                schema: ParameterSchema {
                    command_class: CommandClassSet::Get,
                    data_type: ds::NOT_DEFINED,
                    pdl_size,
                    min_value: 0,
                    max_value: 0,
                    default_value: 0,
                    format: "",
                },
                unit: UNITS_NONE,
                prefix: PREFIX_NONE,
                description,
                alloc_size: 1,
                non_volatile: false,
                handler: ParameterHandler::Builtin,
            }
        };

        self.params.add_deterministic(deterministic_get(
            pids::DMX_PERSONALITY_DESCRIPTION,
            "DMX Personality Description",
            35,
        ))?;
        self.params.add_deterministic(deterministic_get(
            pids::PARAMETER_DESCRIPTION,
            "Parameter Description",
            0x34,
        ))?;
        self.params.add_deterministic(deterministic_get(
            pids::SUPPORTED_PARAMETERS,
            "Supported Parameters",
            0xE6,
        ))?;
        self.params.add_deterministic(deterministic_get(
            pids::QUEUED_MESSAGE,
            "Queued Message",
            1,
        ))?;

        // Mandatory for devices that occupy slots, forbidden otherwise.
        if footprint > 0 {
            self.params.add_alias(
                ParameterDefinition {
                    pid: pids::DMX_START_ADDRESS,
                    schema: ParameterSchema {
                        command_class: CommandClassSet::GetSet,
                        data_type: ds::UNSIGNED_WORD,
                        pdl_size: 2,
                        min_value: 1,
                        max_value: 512,
                        default_value: 1,
                        format: "w$",
                    },
                    unit: UNITS_NONE,
                    prefix: PREFIX_NONE,
                    description: "DMX Start Address",
                    alloc_size: 2,
                    non_volatile: true,
                    handler: ParameterHandler::Simple,
                },
                pids::DEVICE_INFO,
                DI_START_ADDRESS,
            )?;
        }

        Ok(())
    }

    // Dispatch -----------------------------------------------------------

    /// Validates a request and produces the answer to put on the wire.
    pub fn dispatch<HandlerError>(
        &mut self,
        request: &RdmRequestData,
        handler: &mut dyn DmxResponderHandler<Error = HandlerError>,
    ) -> Result<DispatchOutcome, HandlerError> {
        if !request.destination_uid.targets(&self.uid) {
            return Ok(no_outcome());
        }

        if request.command_class == RequestCommandClass::DiscoveryCommand
            && ![
                pids::DISC_UNIQUE_BRANCH,
                pids::DISC_MUTE,
                pids::DISC_UN_MUTE,
            ]
            .contains(&request.parameter_id)
        {
            return Ok(no_outcome());
        }

        if request.parameter_id == pids::DISC_UNIQUE_BRANCH {
            return Ok(DispatchOutcome {
                answer: self.handle_disc_unique_branch(request),
                changed: None,
            });
        }

        let Some(definition) = self.params.definition(request.parameter_id).copied() else {
            // Unregistered PIDs fall through to the application handler.
            let result = handler.handle_rdm(request, self)?;
            return Ok(DispatchOutcome {
                answer: self.build_answer(request, result),
                changed: None,
            });
        };

        if !definition.schema.command_class.permits(request.command_class) {
            // Discovery requests are never answered with a NACK.
            if request.command_class == RequestCommandClass::DiscoveryCommand {
                return Ok(no_outcome());
            }
            return Ok(self.nack_outcome(request, NackReason::UnsupportedCommandClass));
        }

        if request.sub_device != 0 {
            if request.command_class == RequestCommandClass::DiscoveryCommand {
                return Ok(no_outcome());
            }
            return Ok(self.nack_outcome(request, NackReason::SubDeviceOutOfRange));
        }

        let mut changed = None;
        let result = match definition.handler {
            ParameterHandler::Simple => self.handle_simple(request, &definition, &mut changed),
            ParameterHandler::Builtin => self.handle_builtin(request, &mut changed),
            ParameterHandler::Custom(custom) => {
                let result = custom(self, request);
                if request.command_class == RequestCommandClass::SetCommand {
                    changed = Some(ChangedParameter {
                        pid: request.parameter_id,
                        non_volatile: definition.non_volatile,
                    });
                }
                result
            },
        };

        Ok(DispatchOutcome {
            answer: self.build_answer(request, result),
            changed,
        })
    }

    fn nack_outcome(&self, request: &RdmRequestData, reason: NackReason) -> DispatchOutcome {
        DispatchOutcome {
            answer: self.build_answer(request, RdmResult::NotAcknowledged(reason as u16)),
            changed: None,
        }
    }

    fn build_answer(&self, request: &RdmRequestData, result: RdmResult) -> RdmAnswer {
        let message_count = self.message_count();

        let response = match result {
            RdmResult::Acknowledged(mut data) => {
                data.truncate(RDM_MAX_PDL);
                request.build_response(ResponseType::ResponseTypeAck, data, message_count)
            },
            RdmResult::AcknowledgedTimer(timer) => request.build_response(
                ResponseType::ResponseTypeAckTimer,
                DataPack::from_slice(&timer.to_be_bytes()).unwrap(),
                message_count,
            ),
            RdmResult::NotAcknowledged(reason) => request.build_response(
                ResponseType::ResponseTypeNackReason,
                DataPack::from_slice(&reason.to_be_bytes()).unwrap(),
                message_count,
            ),
            RdmResult::NoResponse => return RdmAnswer::NoResponse,
            RdmResult::Custom(response) => Ok(response),
        };

        // Broadcast requests mutate state but produce no reply.
        match response {
            Ok(response) => RdmAnswer::Response(response),
            Err(_) => RdmAnswer::NoResponse,
        }
    }

    // Simple parameters --------------------------------------------------

    fn handle_simple(
        &mut self,
        request: &RdmRequestData,
        definition: &ParameterDefinition,
        changed: &mut Option<ChangedParameter>,
    ) -> RdmResult {
        match request.command_class {
            RequestCommandClass::GetCommand => self.simple_get(definition),
            RequestCommandClass::SetCommand => self.simple_set(request, definition, changed),
            RequestCommandClass::DiscoveryCommand => {
                RdmResult::NotAcknowledged(NackReason::UnsupportedCommandClass as u16)
            },
        }
    }

    fn simple_get(&self, definition: &ParameterDefinition) -> RdmResult {
        let Some(slab) = self.params.get(definition.pid) else {
            return RdmResult::NotAcknowledged(NackReason::HardwareFault as u16);
        };

        let mut wire = [0u8; RDM_MAX_PDL];
        let written = format::serialize(definition.schema.format, slab, &mut wire);
        RdmResult::Acknowledged(DataPack::from_slice(&wire[..written]).unwrap())
    }

    fn simple_set(
        &mut self,
        request: &RdmRequestData,
        definition: &ParameterDefinition,
        changed: &mut Option<ChangedParameter>,
    ) -> RdmResult {
        let format_str = definition.schema.format;
        let is_ascii = definition.schema.data_type == ds::ASCII;

        if !is_ascii {
            match format::packed_size(format_str) {
                Some(size) if request.parameter_data.len() == size => {},
                _ => return RdmResult::NotAcknowledged(NackReason::FormatError as u16),
            }

            if let Some(value) = single_numeric_value(format_str, &request.parameter_data) {
                let schema = &definition.schema;
                if schema.max_value >= schema.min_value
                    && (schema.min_value, schema.max_value) != (0, 0)
                    && !(schema.min_value..=schema.max_value).contains(&value)
                {
                    return RdmResult::NotAcknowledged(NackReason::DataOutOfRange as u16);
                }
            }
        } else if request.parameter_data.len() > 32 {
            return RdmResult::NotAcknowledged(NackReason::FormatError as u16);
        }

        let mut host = [0u8; 64];
        let written = format::deserialize(format_str, &request.parameter_data, &mut host);
        // ASCII stores its whole zero-padded allocation so a shorter label
        // leaves no residue of the previous one.
        let stored = if is_ascii {
            definition.alloc_size.min(host.len())
        } else {
            written.min(definition.alloc_size)
        };
        if self.params.set_and_queue(definition.pid, &host[..stored]) == 0 {
            return RdmResult::NotAcknowledged(NackReason::HardwareFault as u16);
        }

        *changed = Some(ChangedParameter {
            pid: definition.pid,
            non_volatile: definition.non_volatile,
        });

        #[cfg(feature = "log")]
        if definition.pid == pids::IDENTIFY_DEVICE {
            log::info!(
                "rdm identify device is {}",
                if self.identify() { "on" } else { "off" }
            );
        }

        RdmResult::Acknowledged(DataPack::new())
    }

    // Built-in parameters ------------------------------------------------

    fn handle_builtin(
        &mut self,
        request: &RdmRequestData,
        changed: &mut Option<ChangedParameter>,
    ) -> RdmResult {
        match request.parameter_id {
            pids::DISC_MUTE => self.handle_disc_mute(request, true),
            pids::DISC_UN_MUTE => self.handle_disc_mute(request, false),
            pids::DMX_PERSONALITY => self.handle_personality(request, changed),
            pids::DMX_PERSONALITY_DESCRIPTION => self.handle_personality_description(request),
            pids::PARAMETER_DESCRIPTION => self.handle_parameter_description(request),
            pids::SUPPORTED_PARAMETERS => self.handle_supported_parameters(),
            pids::QUEUED_MESSAGE => self.handle_queued_message(request),
            _ => RdmResult::NotAcknowledged(NackReason::UnknownPid as u16),
        }
    }

    fn handle_disc_unique_branch(&mut self, request: &RdmRequestData) -> RdmAnswer {
        if request.command_class != RequestCommandClass::DiscoveryCommand {
            return match request.build_response(
                ResponseType::ResponseTypeNackReason,
                NackReason::UnsupportedCommandClass.serialize(),
                self.message_count(),
            ) {
                Ok(response) => RdmAnswer::Response(response),
                Err(_) => RdmAnswer::NoResponse,
            };
        }

        if request.parameter_data.len() != 12 || self.is_muted() {
            return RdmAnswer::NoResponse;
        }

        let lower_bound = uid_bound(&request.parameter_data[..6]);
        let upper_bound = uid_bound(&request.parameter_data[6..]);
        let own_uid: u64 = self.uid.into();

        if (lower_bound..=upper_bound).contains(&own_uid) {
            RdmAnswer::DiscoveryResponse(self.uid)
        } else {
            RdmAnswer::NoResponse
        }
    }

    fn handle_disc_mute(&mut self, request: &RdmRequestData, mute: bool) -> RdmResult {
        if !request.parameter_data.is_empty() {
            return RdmResult::NoResponse;
        }

        self.set_muted(mute);

        RdmResult::Acknowledged(
            DiscoveryMuteResponse {
                managed_proxy: false,
                sub_device: false,
                boot_loader: false,
                proxy_device: false,
                binding_uid: self.binding_uid,
            }
            .serialize(),
        )
    }

    fn handle_personality(
        &mut self,
        request: &RdmRequestData,
        changed: &mut Option<ChangedParameter>,
    ) -> RdmResult {
        match request.command_class {
            RequestCommandClass::GetCommand => RdmResult::Acknowledged(
                DataPack::from_slice(&[
                    self.current_personality(),
                    self.personalities.len() as u8,
                ])
                .unwrap(),
            ),
            RequestCommandClass::SetCommand => {
                if request.parameter_data.len() != 1 {
                    return RdmResult::NotAcknowledged(NackReason::FormatError as u16);
                }

                let requested = request.parameter_data[0];
                if !(1..=self.personalities.len() as u8).contains(&requested) {
                    return RdmResult::NotAcknowledged(NackReason::DataOutOfRange as u16);
                }

                let footprint = self.personalities[requested as usize - 1].footprint;
                self.params.set_and_queue(pids::DMX_PERSONALITY, &[requested]);
                self.set_device_info_word(DI_FOOTPRINT, footprint);

                *changed = Some(ChangedParameter {
                    pid: pids::DMX_PERSONALITY,
                    non_volatile: true,
                });
                RdmResult::Acknowledged(DataPack::new())
            },
            RequestCommandClass::DiscoveryCommand => {
                RdmResult::NotAcknowledged(NackReason::UnsupportedCommandClass as u16)
            },
        }
    }

    fn handle_personality_description(&mut self, request: &RdmRequestData) -> RdmResult {
        if request.parameter_data.len() != 1 {
            return RdmResult::NotAcknowledged(NackReason::FormatError as u16);
        }

        let requested = request.parameter_data[0];
        let Some(personality) = (requested >= 1)
            .then(|| self.personalities.get(requested as usize - 1))
            .flatten()
        else {
            return RdmResult::NotAcknowledged(NackReason::DataOutOfRange as u16);
        };

        let mut data = DataPack::new();
        data.push(requested).unwrap();
        data.extend_from_slice(&personality.footprint.to_be_bytes())
            .unwrap();
        let description = personality.description.as_bytes();
        data.extend_from_slice(&description[..description.len().min(32)])
            .unwrap();

        RdmResult::Acknowledged(data)
    }

    fn handle_parameter_description(&mut self, request: &RdmRequestData) -> RdmResult {
        if request.parameter_data.len() != 2 {
            return RdmResult::NotAcknowledged(NackReason::FormatError as u16);
        }

        let requested = u16::from_be_bytes(request.parameter_data[..2].try_into().unwrap());
        match self.params.description(requested) {
            Some(description) => RdmResult::Acknowledged(description.serialize()),
            None => RdmResult::NotAcknowledged(NackReason::DataOutOfRange as u16),
        }
    }

    fn handle_supported_parameters(&mut self) -> RdmResult {
        // The minimum required PIDs are implied and not listed.
        const IMPLIED: [u16; 9] = [
            pids::DISC_UNIQUE_BRANCH,
            pids::DISC_MUTE,
            pids::DISC_UN_MUTE,
            pids::SUPPORTED_PARAMETERS,
            pids::PARAMETER_DESCRIPTION,
            pids::DEVICE_INFO,
            pids::SOFTWARE_VERSION_LABEL,
            pids::DMX_START_ADDRESS,
            pids::IDENTIFY_DEVICE,
        ];

        let mut registered = [0u16; crate::consts::RESPONDER_PIDS_MAX];
        let count = self.params.list(&mut registered).min(registered.len());

        let mut data = DataPack::new();
        for pid in &registered[..count] {
            if IMPLIED.contains(pid) {
                continue;
            }
            if data.extend_from_slice(&pid.to_be_bytes()).is_err() {
                break;
            }
        }

        RdmResult::Acknowledged(data)
    }

    fn handle_queued_message(&mut self, request: &RdmRequestData) -> RdmResult {
        // The parameter data is a status-type filter.
        if request.parameter_data.len() != 1
            || !(0x01..=0x04).contains(&request.parameter_data[0])
        {
            return RdmResult::NotAcknowledged(NackReason::DataOutOfRange as u16);
        }

        let (parameter_id, data) = match self.params.queue_pop() {
            Some(pid) => {
                let mut wire = [0u8; RDM_MAX_PDL];
                let written = match (self.params.definition(pid), self.params.get(pid)) {
                    (Some(definition), Some(slab)) => {
                        format::serialize(definition.schema.format, slab, &mut wire)
                    },
                    _ => 0,
                };
                (pid, DataPack::from_slice(&wire[..written]).unwrap())
            },
            // An empty ring answers with an empty status-message list.
            None => (pids::STATUS_MESSAGES, DataPack::new()),
        };

        let mut response = match request.build_response(
            ResponseType::ResponseTypeAck,
            data,
            self.message_count(),
        ) {
            Ok(response) => response,
            Err(_) => return RdmResult::NoResponse,
        };
        response.parameter_id = parameter_id;

        RdmResult::Custom(response)
    }
}

/// Writes the raw slab of a non-volatile parameter through to storage.
pub fn persist_parameter(
    core: &ResponderCore,
    nvs: &mut dyn NvsStore,
    changed: ChangedParameter,
) -> bool {
    if !changed.non_volatile {
        return true;
    }

    let Some(slab) = core.params.get(changed.pid) else {
        return false;
    };

    nvs.save(&nvs_key(core.port_num(), changed.pid), slab)
}

fn no_outcome() -> DispatchOutcome {
    DispatchOutcome {
        answer: RdmAnswer::NoResponse,
        changed: None,
    }
}

fn uid_bound(bytes: &[u8]) -> u64 {
    let mut padded = [0u8; 8];
    padded[2..].copy_from_slice(&bytes[..6]);
    u64::from_be_bytes(padded)
}

/// The wire value of a SET for single-field numeric formats, used for
/// min/max validation.
fn single_numeric_value(format: &str, parameter_data: &[u8]) -> Option<u32> {
    match format {
        "b$" => Some(parameter_data[0] as u32),
        "w$" => Some(u16::from_be_bytes(parameter_data.try_into().ok()?) as u32),
        "d$" => Some(u32::from_be_bytes(parameter_data.try_into().ok()?)),
        _ => None,
    }
}

fn copy_ascii_init(slab: &mut [u8; 32], text: &str) {
    let bytes = text.as_bytes();
    let len = bytes.len().min(32);
    slab[..len].copy_from_slice(&bytes[..len]);
}
